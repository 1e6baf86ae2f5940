use bytes::BytesMut;
use minidb::*;

#[test]
fn parse_many_handles_pipelined_lines() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"POST a 1\r\n");
    buf.extend_from_slice(b"   \n");
    buf.extend_from_slice(b"GET a\nDELETE a\nGET");

    let mut reqs = Vec::new();
    protocol::parse_many(&mut buf, &mut reqs);

    assert_eq!(reqs.len(), 3);
    assert_eq!(reqs[0].verb, Verb::Post);
    assert_eq!(reqs[0].args, vec!["a", "1"]);
    assert_eq!(reqs[1].verb, Verb::Get);
    assert_eq!(reqs[2].verb, Verb::Delete);
    // the unterminated tail waits for more input
    assert_eq!(&buf[..], b"GET");
}

#[test]
fn tokens_are_trimmed_of_control_characters() {
    let req = Request::parse(b"\tGET \x01key\x02  \r").unwrap();
    assert_eq!(req.verb, Verb::Get);
    assert_eq!(req.args, vec!["key"]);
}

#[test]
fn unknown_verb_keeps_arguments() {
    let req = Request::parse(b"FOO bar baz").unwrap();
    assert_eq!(req.verb, Verb::Unknown);
    assert_eq!(req.args, vec!["bar", "baz"]);
}
