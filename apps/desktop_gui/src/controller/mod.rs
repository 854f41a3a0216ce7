//! Controller layer: UI events, reducer-like effect application, and command orchestration.

pub mod events;
pub mod orchestration;
pub mod reducer;
