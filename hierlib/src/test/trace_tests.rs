use std::io::Cursor;

use crate::error::TraceError;
use crate::trace::{parse_line, MemAccess, TraceReader, TraceSource, VecTrace};
use crate::util::{strided, to_trace_text};

#[test]
fn parses_accepted_line_forms() {
    assert_eq!(parse_line(1, "0x1000 L"), Ok(Some(MemAccess::load(0x1000))));
    assert_eq!(parse_line(2, "1000 s"), Ok(Some(MemAccess::store(0x1000))));
    assert_eq!(parse_line(3, "  DEADBEEF W  \n"), Ok(Some(MemAccess::store(0xdead_beef))));
    assert_eq!(parse_line(4, "0Xff r"), Ok(Some(MemAccess::load(0xff))));
    assert_eq!(parse_line(5, ""), Ok(None));
    assert_eq!(parse_line(6, "# loads only"), Ok(None));
}

#[test]
fn rejects_malformed_lines() {
    assert_eq!(
        parse_line(7, "0x1000"),
        Err(TraceError { line: 7, text: "0x1000".to_string() })
    );
    assert!(parse_line(8, "0x123456789 L").is_err());
    assert!(parse_line(9, "zz L").is_err());
    assert!(parse_line(10, "0x10 X").is_err());
}

#[test]
fn reader_skips_bad_lines() {
    let text = "# header\n0x10 L\nnonsense\n\n0x20 S\n0x30 L";
    let mut reader = TraceReader::new(Cursor::new(text));
    let accesses: Vec<MemAccess> = std::iter::from_fn(|| reader.next_access()).collect();
    assert_eq!(accesses, vec![MemAccess::load(0x10), MemAccess::store(0x20), MemAccess::load(0x30)]);
    assert_eq!(reader.skipped_lines(), 1);
}

#[test]
fn reader_skips_lines_which_are_not_utf8() {
    let bytes: &[u8] = b"0x10 L\n\xff\xfe L\n0x20 L\n0x30 S\n";
    let mut reader = TraceReader::new(Cursor::new(bytes));
    let accesses: Vec<MemAccess> = std::iter::from_fn(|| reader.next_access()).collect();
    assert_eq!(accesses, vec![MemAccess::load(0x10), MemAccess::load(0x20), MemAccess::store(0x30)]);
    assert_eq!(reader.skipped_lines(), 1);
}

#[test]
fn generated_text_reads_back() {
    let accesses = strided(0xfff0_0000, 0x40, 16, false);
    let mut reader = TraceReader::new(Cursor::new(to_trace_text(&accesses)));
    let mut vec_trace: VecTrace = accesses.iter().copied().collect();
    assert_eq!(vec_trace.len(), 16);
    while let Some(expected) = vec_trace.next_access() {
        assert_eq!(reader.next_access(), Some(expected));
    }
    assert_eq!(reader.next_access(), None);
}
