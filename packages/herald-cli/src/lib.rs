use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str =
	"Watches an event listing and notifies subscribers of new and changed events.";

/// Terminal styles shared by every herald binary.
pub fn styles() -> Styles {
	let emphasis = Effects::BOLD;

	Styles::styled()
		.header(AnsiColor::Yellow.on_default() | emphasis)
		.usage(AnsiColor::Yellow.on_default() | emphasis)
		.literal(AnsiColor::Cyan.on_default() | emphasis)
		.placeholder(AnsiColor::Green.on_default())
		.valid(AnsiColor::Green.on_default() | emphasis)
		.invalid(AnsiColor::Red.on_default())
		.error(AnsiColor::Red.on_default() | emphasis)
}
