//! Pointer interaction: selection and dragging.

mod drag;
mod selection;

pub use drag::{DragController, DragEnd};
pub use selection::{ClickOutcome, Modifiers, SelectionModel, SelectionPhase, compute_selection_rect};
