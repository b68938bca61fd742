mod presentation;
mod slide;
mod user;

pub use presentation::{Presentation, PresentationPatch, DEFAULT_THEME_ID};
pub use slide::{Alignment, FontScale, LayoutType, LayoutVariant, Slide, SlidePatch};
pub use user::ActiveUser;
