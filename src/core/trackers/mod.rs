pub mod commerce;
pub mod events;
pub mod tasks;
pub mod wvw;
