pub mod evaluate;
pub mod portfolio;
pub mod rules;
pub mod setup;
pub mod ui;
