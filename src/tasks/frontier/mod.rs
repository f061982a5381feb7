pub mod filters;
pub mod policies;
pub mod scheduler;
pub mod snooze;
pub mod work_queue;
