mod display;

pub use display::MainDisplay;
