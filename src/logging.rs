use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime, UtcOffset};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
    FmtSubscriber,
};

const TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

/// Read the local UTC offset.
///
/// Must be called before any other thread is spawned, as the offset
/// cannot be soundly queried from a multi-threaded process on some platforms.
pub fn local_offset() -> Result<UtcOffset> {
    UtcOffset::current_local_offset()
        .into_diagnostic()
        .wrap_err("Could not get current local time offset")
}

/// Initialize the logging system
pub fn init_logging(level: Level, offset: UtcOffset) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .event_format(PipelineLogger::new(offset))
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .into_diagnostic()
        .wrap_err("Setting default subscriber failed")
}

/// Compact one-line format: local time, level, emitting module, fields.
///
/// Both processes are single-threaded so the module path says more
/// than the thread name would.
struct PipelineLogger {
    offset: UtcOffset,
}

impl PipelineLogger {
    fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    /// Strip the crate name from the event target
    fn component(target: &str) -> &str {
        match target.split_once("::") {
            Some((_, rest)) => rest,
            None => target,
        }
    }
}

impl<S, N> FormatEvent<S, N> for PipelineLogger
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        let now = OffsetDateTime::now_utc().to_offset(self.offset).time();
        let now = now.format(TIME_FORMAT).map_err(|_| std::fmt::Error)?;
        let component = Self::component(metadata.target());

        if writer.has_ansi_escapes() {
            let level = match *metadata.level() {
                Level::ERROR => metadata.level().red().to_string(),
                Level::WARN => metadata.level().yellow().to_string(),
                Level::DEBUG | Level::TRACE => metadata.level().blue().to_string(),
                _ => metadata.level().green().to_string(),
            };

            write!(
                &mut writer,
                "{} {:>5} {} ",
                now.dimmed(),
                level,
                component.cyan()
            )?;
        } else {
            write!(
                &mut writer,
                "{} {:>5} {} ",
                now,
                metadata.level(),
                component
            )?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
