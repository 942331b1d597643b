pub mod lifecycle;
pub mod matching;
pub mod registry;
pub mod tier;
