#[path = "it/redis_queue.rs"]
mod redis_queue;
