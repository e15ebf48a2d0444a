//! Contract matrix for `StreamForwarder`: every buffer-size/mode/input
//! combination exercised under no sinks, capture only, forwarding, and
//! forwarding plus capture.

use std::sync::{Arc, Mutex};

use stream_relay::{SinkFn, StreamForwarder, NEWLINE};

fn ln(content: &str) -> String {
    format!("{content}{NEWLINE}")
}

/// Capture transcript: `\r\n` and bare `\n` become the platform newline,
/// everything else verbatim.
fn expected_captured(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\n', NEWLINE)
}

fn run_pass(
    buffer_size: usize,
    raw_sink: bool,
    line_sink: bool,
    capture: bool,
    input: &str,
) -> (Vec<String>, Option<String>) {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let sink = |writes: &Arc<Mutex<Vec<String>>>| -> SinkFn {
        let writes = Arc::clone(writes);
        Box::new(move |text: &str| {
            writes.lock().unwrap().push(text.to_string());
            Ok(())
        })
    };

    let mut forwarder = StreamForwarder::with_buffer_size(buffer_size).unwrap();
    let write = if raw_sink { Some(sink(&writes)) } else { None };
    let write_line = if line_sink { Some(sink(&writes)) } else { None };
    forwarder.forward_to(write, write_line);
    if capture {
        forwarder.capture();
    }
    forwarder.read(input.as_bytes()).unwrap();

    let captured = forwarder.captured_output().map(str::to_string);
    let writes = writes.lock().unwrap().clone();
    (writes, captured)
}

/// One matrix row, exercised the four ways: no sinks, capture only,
/// forwarding, forwarding plus capture. `unbuffered` attaches both the raw
/// and line sinks; otherwise only the line sink.
fn check(buffer_size: usize, unbuffered: bool, input: &str, expected_writes: &[String]) {
    let expected_captured = expected_captured(input);

    let (writes, captured) = run_pass(buffer_size, false, false, false, input);
    assert!(writes.is_empty(), "input {input:?}: no sinks, no writes");
    assert_eq!(captured, None, "input {input:?}");

    let (writes, captured) = run_pass(buffer_size, false, false, true, input);
    assert!(writes.is_empty(), "input {input:?}: capture invokes no sinks");
    assert_eq!(captured.as_deref(), Some(expected_captured.as_str()), "input {input:?}");

    let (writes, captured) = run_pass(buffer_size, unbuffered, true, false, input);
    assert_eq!(writes, expected_writes, "input {input:?}");
    assert_eq!(captured, None, "input {input:?}");

    let (writes, captured) = run_pass(buffer_size, unbuffered, true, true, input);
    assert_eq!(writes, expected_writes, "input {input:?}");
    assert_eq!(captured.as_deref(), Some(expected_captured.as_str()), "input {input:?}");
}

#[test]
fn unbuffered() {
    check(4, true, "", &[]);
    check(4, true, "123", &["123".into()]);
    check(4, true, "1234", &["1234".into()]);
    check(3, true, "123456789", &["123".into(), "456".into(), "789".into()]);
    check(4, true, "\r\n", &[ln("")]);
    check(4, true, "\r\n34", &[ln(""), "34".into()]);
    check(4, true, "1\r\n4", &[ln("1"), "4".into()]);
    check(4, true, "12\r\n", &[ln("12")]);
    check(4, true, "123\r\n", &[ln("123")]);
    check(4, true, "1234\r\n", &["1234".into(), ln("")]);
    // A line boundary resets the span; the size flush always carries exactly
    // buffer_size characters.
    check(3, true, "\r\n3456\r\n9", &[ln(""), "345".into(), ln("6"), "9".into()]);
    check(4, true, "\n", &[ln("")]);
    check(4, true, "\n234", &[ln(""), "234".into()]);
    check(4, true, "1\n34", &[ln("1"), "34".into()]);
    check(4, true, "12\n4", &[ln("12"), "4".into()]);
    check(4, true, "123\n", &[ln("123")]);
    check(4, true, "1234\n", &["1234".into(), ln("")]);
    check(3, true, "\n23456\n89", &[ln(""), "234".into(), ln("56"), "89".into()]);
}

#[test]
fn line_buffered() {
    check(4, false, "", &[]);
    check(4, false, "123", &[ln("123")]);
    check(4, false, "1234", &[ln("1234")]);
    // Without a raw sink there is no size-triggered flush; the line grows
    // past buffer_size until EOS.
    check(3, false, "123456789", &[ln("123456789")]);
    check(4, false, "\r\n", &[ln("")]);
    check(4, false, "\r\n34", &[ln(""), ln("34")]);
    check(4, false, "1\r\n4", &[ln("1"), ln("4")]);
    check(4, false, "12\r\n", &[ln("12")]);
    check(4, false, "123\r\n", &[ln("123")]);
    check(4, false, "1234\r\n", &[ln("1234")]);
    check(3, false, "\r\n3456\r\n9", &[ln(""), ln("3456"), ln("9")]);
    check(4, false, "\n", &[ln("")]);
    check(4, false, "\n234", &[ln(""), ln("234")]);
    check(4, false, "1\n34", &[ln("1"), ln("34")]);
    check(4, false, "12\n4", &[ln("12"), ln("4")]);
    check(4, false, "123\n", &[ln("123")]);
    check(4, false, "1234\n", &[ln("1234")]);
    check(3, false, "\n23456\n89", &[ln(""), ln("23456"), ln("89")]);
}
