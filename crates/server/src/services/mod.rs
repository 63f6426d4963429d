pub mod events;
pub mod honeypots;
