pub mod health;
pub mod stacks;
pub mod webhooks;
