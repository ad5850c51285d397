use super::*;

#[test]
fn iterates_sibling_boxes() {
    let mut data = Vec::new();
    write_box(&mut data, b"free", |out| out.extend_from_slice(&[1, 2, 3]));
    write_full_box(&mut data, b"test", 1, 7, |out| put_u16(out, 9));
    let found: Vec<_> = boxes(&data).collect::<RenderResult<_>>().unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(&found[0].kind, b"free");
    assert_eq!(found[0].payload, &[1, 2, 3]);
    assert_eq!(found[1].payload, &[1, 0, 0, 7, 0, 9]);
    assert!(require(&data, b"moov").is_err());
    assert_eq!(child(&data, b"test").unwrap().unwrap().kind_str(), "test");
}

#[test]
fn reads_64_bit_box_sizes() {
    let mut data = Vec::new();
    put_u32(&mut data, 1);
    data.extend_from_slice(b"mdat");
    put_u64(&mut data, 18);
    data.extend_from_slice(&[0xAA, 0xBB]);
    let b = boxes(&data).next().unwrap().unwrap();
    assert_eq!(b.payload, &[0xAA, 0xBB]);
}

#[test]
fn overrunning_box_is_a_parse_error() {
    let mut data = Vec::new();
    put_u32(&mut data, 64);
    data.extend_from_slice(b"moov");
    let err = boxes(&data).next().unwrap();
    assert!(matches!(err, Err(RenderError::Parse(_))));
}

#[test]
fn descriptors_round_trip() {
    let mut out = Vec::new();
    write_descriptor(&mut out, 0x05, &[0x12, 0x10]);
    let mut c = Cursor::new(&out);
    assert_eq!(read_descriptor(&mut c).unwrap(), (0x05, 2));
    assert_eq!(c.take(2).unwrap(), &[0x12, 0x10]);
    assert_eq!(c.position(), out.len());
}

#[test]
fn cursor_reports_truncation() {
    let mut c = Cursor::new(&[0, 1, 2]);
    assert_eq!(c.u24().unwrap(), 0x0102);
    assert!(c.u8().is_err());
}
