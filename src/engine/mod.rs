pub mod abstract_avr;
pub mod memory;
pub mod model_checker;
pub mod property;
pub mod system;

pub use abstract_avr::*;
pub use memory::*;
pub use model_checker::*;
pub use property::*;
pub use system::Device;
