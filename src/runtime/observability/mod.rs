mod factory;
pub mod jsonl;
pub mod log;
pub mod multi;
pub mod noop;
pub mod traits;

pub use self::log::LogObserver;
pub use factory::create_observer;
pub use jsonl::JsonlObserver;
pub use multi::MultiObserver;
pub use noop::NoopObserver;
pub use traits::{Observer, ObserverEvent};
