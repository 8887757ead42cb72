// crates.io
use tracing::instrument::Instrumented;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
// self
use crate::{_prelude::*, obs::FlowKind};

/// Log output format selected by the binaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
	/// Human-readable lines.
	#[default]
	Text,
	/// One JSON object per event.
	Json,
}

/// A span builder used by identity flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		let span = tracing::info_span!("memberportal_identity.flow", flow = kind.as_str(), stage);

		Self { span }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		FlowSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	_guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

/// Installs the global subscriber. `RUST_LOG` filters events and defaults to `info`.
pub fn install_subscriber(format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);

	match format {
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json().flatten_event(true).with_target(true))
			.init(),
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer().with_target(true)).init(),
	}
}
