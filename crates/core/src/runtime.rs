use anyhow::{Context, Result};
use candle_core::{DType, Device};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{
    Dispatch, Event, Level, Metadata, Subscriber,
    dispatcher,
    level_filters::LevelFilter,
    span::{Attributes, Id, Record},
    subscriber::Interest,
};
use tracing_core::span::Current;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Metal,
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
    Bf16,
}

/// Open compute unit `ordinal` of the requested kind.
pub fn prepare_device_and_dtype(
    device: DeviceKind,
    ordinal: usize,
    precision: Option<Precision>,
) -> Result<(Device, DType)> {
    let (device, default_precision) = match device {
        DeviceKind::Cpu => (Device::Cpu, Precision::F32),
        DeviceKind::Metal => (
            Device::new_metal(ordinal).context("failed to initialise Metal device")?,
            Precision::Bf16,
        ),
        DeviceKind::Cuda => (
            Device::new_cuda(ordinal).context("failed to initialise CUDA device")?,
            Precision::Bf16,
        ),
    };
    let dtype = dtype_from_precision(precision.unwrap_or(default_precision));
    Ok((device, dtype))
}

pub fn dtype_from_precision(p: Precision) -> DType {
    match p {
        Precision::F32 => DType::F32,
        Precision::F16 => DType::F16,
        Precision::Bf16 => DType::BF16,
    }
}

/// Run `f` with only errors reaching the current subscriber when `quiet` is set.
///
/// Events still flow into the caller's subscriber; only their level is capped for
/// the duration of the call, on this thread.
pub fn with_quiet_logging<T>(quiet: bool, f: impl FnOnce() -> T) -> T {
    if !quiet {
        return f();
    }
    let host = dispatcher::get_default(Dispatch::clone);
    let quiet = Dispatch::new(ErrorsOnly(host));
    dispatcher::with_default(&quiet, f)
}

/// Forwards to the wrapped dispatcher, dropping everything below ERROR.
struct ErrorsOnly(Dispatch);

impl Subscriber for ErrorsOnly {
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        *metadata.level() <= Level::ERROR && self.0.enabled(metadata)
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        Some(LevelFilter::ERROR)
    }

    fn new_span(&self, span: &Attributes<'_>) -> Id {
        self.0.new_span(span)
    }

    fn record(&self, span: &Id, values: &Record<'_>) {
        self.0.record(span, values)
    }

    fn record_follows_from(&self, span: &Id, follows: &Id) {
        self.0.record_follows_from(span, follows)
    }

    fn event(&self, event: &Event<'_>) {
        self.0.event(event)
    }

    fn enter(&self, span: &Id) {
        self.0.enter(span)
    }

    fn exit(&self, span: &Id) {
        self.0.exit(span)
    }

    fn clone_span(&self, id: &Id) -> Id {
        self.0.clone_span(id)
    }

    fn try_close(&self, id: Id) -> bool {
        self.0.try_close(id)
    }

    fn current_span(&self) -> Current {
        self.0.current_span()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::{
        Layer,
        layer::{Context, SubscriberExt},
    };

    use super::*;

    #[test]
    fn cpu_defaults_to_f32() {
        let (device, dtype) = prepare_device_and_dtype(DeviceKind::Cpu, 0, None).unwrap();
        assert!(device.is_cpu());
        assert_eq!(dtype, DType::F32);
        let (_, dtype) =
            prepare_device_and_dtype(DeviceKind::Cpu, 0, Some(Precision::Bf16)).unwrap();
        assert_eq!(dtype, DType::BF16);
    }

    #[test]
    fn quiet_scope_returns_closure_value() {
        assert_eq!(with_quiet_logging(true, || 7), 7);
        assert_eq!(with_quiet_logging(false, || "loud"), "loud");
    }

    #[derive(Clone, Default)]
    struct Levels(Arc<Mutex<Vec<Level>>>);

    impl<S: Subscriber> Layer<S> for Levels {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    #[test]
    fn quiet_scope_filters_host_subscriber() {
        let levels = Levels::default();
        let host = tracing_subscriber::registry().with(levels.clone());
        tracing::subscriber::with_default(host, || {
            tracing::warn!("before");
            with_quiet_logging(true, || {
                tracing::warn!("hidden");
                tracing::error!("kept");
            });
            with_quiet_logging(false, || tracing::debug!("loud"));
            tracing::info!("after");
        });
        assert_eq!(
            *levels.0.lock().unwrap(),
            [Level::WARN, Level::ERROR, Level::DEBUG, Level::INFO]
        );
    }
}
