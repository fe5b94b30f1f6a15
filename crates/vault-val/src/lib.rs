mod string;
pub use string::*;

mod error;
pub use error::*;

mod path;
pub use path::*;

mod linear;
pub use linear::*;

mod types;
pub use types::*;

mod capability;
pub use capability::*;

mod reference;
pub use reference::*;

mod value;
pub use value::*;
