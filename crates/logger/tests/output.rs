use logger::format::{COLOR_BLUE, COLOR_GRAY, COLOR_RED, COLOR_RESET, COLOR_YELLOW};
use logger::{LogFormat, LogSettings, subscriber};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Collects everything written by a subscriber.
#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Buffer {
    type Writer = Buffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture(settings: LogSettings, f: impl FnOnce()) -> String {
    let buffer = Buffer::default();
    tracing::subscriber::with_default(subscriber(&settings, buffer.clone()), f);
    buffer.contents()
}

fn text(level: Level, color: bool) -> LogSettings {
    LogSettings { level, format: LogFormat::Text, color }
}

#[test]
fn colored_text_wraps_each_line() {
    let cases = [
        (Level::INFO, COLOR_BLUE, "level=INFO"),
        (Level::ERROR, COLOR_RED, "level=ERROR"),
        (Level::WARN, COLOR_YELLOW, "level=WARN"),
        (Level::DEBUG, COLOR_GRAY, "level=DEBUG"),
    ];

    for (level, color, marker) in cases {
        let output = capture(text(Level::DEBUG, true), || match level {
            Level::INFO => tracing::info!(key = "value", "test info message"),
            Level::ERROR => tracing::error!(code = 500, "error occurred"),
            Level::WARN => tracing::warn!("warning"),
            _ => tracing::debug!(debug = true, "debug info"),
        });

        assert!(output.starts_with(color), "{output:?} should start with {color:?}");
        assert!(output.ends_with(&format!("{COLOR_RESET}\n")), "{output:?}");
        assert!(output.contains(marker), "{output:?}");
        assert!(output.contains("time="), "{output:?}");
    }
}

#[test]
fn fields_are_rendered_as_key_value_pairs() {
    let output = capture(text(Level::DEBUG, false), || {
        tracing::info!(key = "value", code = 500, debug = true, "test info message");
    });

    assert!(output.contains("msg=\"test info message\""), "{output}");
    assert!(output.contains("key=value"), "{output}");
    assert!(output.contains("code=500"), "{output}");
    assert!(output.contains("debug=true"), "{output}");
    assert!(!output.contains('\x1b'), "no escapes without color: {output:?}");
}

#[test]
fn threshold_filters_lower_levels() {
    let output = capture(text(Level::INFO, false), || {
        tracing::debug!("hidden");
        tracing::info!("shown");
        tracing::warn!("also shown");
    });

    assert!(!output.contains("hidden"));
    assert!(output.contains("shown"));
    assert_eq!(output.lines().count(), 2);
}

#[test]
fn one_line_per_event() {
    let output = capture(text(Level::DEBUG, true), || {
        tracing::info!("first message");
        tracing::warn!("second message");
        tracing::error!("third message");
    });

    assert_eq!(output.trim_end().lines().count(), 3);
    for msg in ["first message", "second message", "third message"] {
        assert!(output.contains(msg));
    }
}

#[test]
fn json_format_emits_objects() {
    let settings = LogSettings { level: Level::INFO, format: LogFormat::Json, color: true };
    let output = capture(settings, || tracing::info!(service = "shared", "hello"));

    let line = output.lines().next().expect("one line");
    assert!(line.starts_with('{') && line.ends_with('}'), "{line}");
    assert!(line.contains("\"level\":\"INFO\""), "{line}");
    assert!(line.contains("\"message\":\"hello\""), "{line}");
    assert!(line.contains("\"service\":\"shared\""), "{line}");
    assert!(!line.contains('\x1b'));
}

#[test]
fn concurrent_writers_do_not_interleave_lines() {
    let buffer = Buffer::default();
    let dispatch = tracing::Dispatch::new(subscriber(&text(Level::INFO, false), buffer.clone()));

    let handles: Vec<_> = (0..10)
        .map(|id| {
            let dispatch = dispatch.clone();
            std::thread::spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    for msg in 0..10 {
                        tracing::info!(worker = id, msg, "concurrent message");
                    }
                });
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let output = buffer.contents();
    assert_eq!(output.lines().count(), 100);
    assert!(output.lines().all(|l| l.contains("level=INFO") && l.contains("worker=")));
}

#[test]
fn global_settings_are_initialized_once() {
    let first = logger::init();
    let second = logger::settings();
    assert!(std::ptr::eq(first, second));
}
