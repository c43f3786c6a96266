//! Miscellaneous test code for the WabiSabi coordinator workspace.
// Standard lints
#![warn(missing_docs)]
#![allow(clippy::try_err)]
#![deny(clippy::await_holding_lock)]
#![forbid(unsafe_code)]

use std::{env, sync::Once};

use color_eyre::section::PanicMessage;
use owo_colors::OwoColorize;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod prelude;

static INIT: Once = Once::new();

/// Initialize globals for tests such as the tracing subscriber and panic / error
/// reporting hooks
pub fn init() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer().with_target(false);
        // Use the RUST_LOG env var, or by default:
        //  - warn for most tests, and
        //  - error for the coordinator, which warns about every punished or failed round
        let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new("warn")
                .unwrap()
                .add_directive("wabisabi_coordinator=error".parse().unwrap())
                .add_directive("wabisabi_client=error".parse().unwrap())
        });

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .init();

        color_eyre::config::HookBuilder::default()
            .add_frame_filter(Box::new(|frames| {
                let filters = &[
                    "tokio::",
                    "<futures_util::",
                    "std::panic",
                    "test::run_test_in_process",
                    "core::ops::function::FnOnce::call_once",
                    "<core::future::",
                    "<alloc::boxed::Box",
                ];

                frames.retain(|frame| match frame.name.as_ref() {
                    Some(name) => !filters.iter().any(|f| name.starts_with(f)),
                    None => true,
                });
            }))
            .panic_message(SkipTestReturnedErrPanicMessages)
            .install()
            .unwrap();
    })
}

/// Returns the number of proptest cases to run.
///
/// Uses the `PROPTEST_CASES` env var if it is set, or `default_cases` otherwise.
/// Credential proofs are expensive, so most property tests use a small default.
pub fn proptest_cases(default_cases: u32) -> u32 {
    env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_cases)
}

struct SkipTestReturnedErrPanicMessages;

impl PanicMessage for SkipTestReturnedErrPanicMessages {
    fn display(
        &self,
        pi: &std::panic::PanicInfo<'_>,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let payload = pi
            .payload()
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| pi.payload().downcast_ref::<&str>().cloned())
            .unwrap_or("<non string panic payload>");

        // the test harness has already printed the `Err` a test returned
        if payload.contains("the test returned a termination value with a non-zero status code") {
            return write!(f, "---- end of test output ----");
        }

        writeln!(f, "{}", "\nThe coordinator test panicked.".red())?;
        writeln!(f, "Message:  {}", payload.cyan())?;

        match pi.location() {
            Some(loc) => write!(f, "Location: {}:{}", loc.file().purple(), loc.line().purple()),
            None => write!(f, "Location: <unknown>"),
        }
    }
}
