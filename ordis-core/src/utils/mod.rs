pub mod pass_interval;
