mod value;
mod handle;
mod header;
mod error;
mod method;
mod special;
pub mod layout;

pub use value::{Decoded, Tag, Value};
pub use handle::{Handle, Space};
pub use header::{HEADER_WORDS, Header, HeapState};
pub use error::ObjectError;
pub use method::{MethodHeader, MethodKind};
pub use layout::{Format, Storage};
pub use special::SpecialObjects;
