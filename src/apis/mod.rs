pub mod emuseum;

pub use emuseum::EmuseumApi;
