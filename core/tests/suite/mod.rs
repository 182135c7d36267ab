// Aggregates all former standalone integration tests as modules.
mod classifier;
mod controller;
mod gemini_api;
mod scheduler;
