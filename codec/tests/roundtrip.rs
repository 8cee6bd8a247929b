//! End-to-end encode/decode tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::io::Cursor;
use tokio::io::AsyncWriteExt;
use tokio_util::{compat::TokioAsyncReadCompatExt, sync::CancellationToken};

use graphwire::{
    decode, encode,
    types::{
        BigInt, CustomValue, Deferred, ErrorValue, Map, Record, Regexp, Sequence, Set,
        Settlement, Slot, Symbol, Timestamp, Url, Value,
    },
    DecodeError, DecodeOptions, DecodePlugin, EncodeError, EncodeOptions, EncodePlugin,
    PluginError, Replacement,
};

/// Encodes `value` with the given options, returning the raw stream bytes.
async fn encode_to_vec(value: &Value, options: EncodeOptions) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    encode(value, &mut cursor, options)
        .await
        .expect("encoding should succeed");
    cursor.into_inner()
}

/// Full round trip: encode, decode, drive `done` to completion.
async fn roundtrip(value: &Value) -> Value {
    roundtrip_with(value, EncodeOptions::default(), DecodeOptions::default()).await
}

async fn roundtrip_with(
    value: &Value,
    encode_options: EncodeOptions,
    decode_options: DecodeOptions,
) -> Value {
    let bytes = encode_to_vec(value, encode_options).await;
    let decoded = decode(Cursor::new(bytes), decode_options)
        .await
        .expect("decoding should succeed");
    decoded.done.await.expect("stream should finish cleanly");
    decoded.value
}

fn frame_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&byte| byte == b'\n').count()
}

#[tokio::test]
async fn atoms_round_trip() {
    for atom in [
        Value::Undefined,
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Number(f64::INFINITY),
        Value::Number(f64::NEG_INFINITY),
        Value::String(String::new()),
    ] {
        let decoded = roundtrip(&atom).await;
        assert!(decoded.same(&atom), "{atom:?} should round trip");
    }

    match roundtrip(&Value::Number(f64::NAN)).await {
        Value::Number(number) => assert!(number.is_nan()),
        other => panic!("expected a number, got {other:?}"),
    }
    match roundtrip(&Value::Number(-0.0)).await {
        Value::Number(number) => assert_eq!(number.to_bits(), (-0.0f64).to_bits()),
        other => panic!("expected a number, got {other:?}"),
    }
}

#[tokio::test]
async fn scalars_round_trip() {
    let big: BigInt = "123456789012345678901234567890123456789"
        .parse()
        .expect("should parse");
    for scalar in [
        Value::from(42.5),
        Value::from(-1.0e100),
        Value::from(BigInt::from(-7)),
        Value::BigInt(big),
        Value::from("hello"),
        Value::from("snowman ☃"),
        Value::Symbol(Symbol::for_name("marker")),
        Value::Timestamp(Timestamp::from_millis(1_650_000_000_123)),
        Value::Regexp(Regexp::new("ab+c", "gi")),
        Value::Url(Url::new("https://example.com/path?q=1")),
    ] {
        let decoded = roundtrip(&scalar).await;
        assert!(
            decoded.structural_eq(&scalar),
            "{scalar:?} should round trip"
        );
    }

    // Symbols come back interned: identical to a fresh lookup of the name.
    let decoded = roundtrip(&Value::Symbol(Symbol::for_name("marker"))).await;
    assert!(decoded.same(&Value::Symbol(Symbol::for_name("marker"))));
}

#[tokio::test]
async fn sequence_holes_stay_absent() {
    let sequence = Sequence::new();
    sequence.push(Value::from(1.0));
    sequence.push_hole();
    sequence.push(Value::from(3.0));

    let decoded = roundtrip(&Value::Sequence(sequence)).await;
    let Value::Sequence(decoded) = decoded else {
        panic!("expected a sequence");
    };
    assert_eq!(decoded.len(), 3);
    assert!(matches!(decoded.slot(1), Some(Slot::Hole)));
    assert!(decoded.get(0).unwrap().same(&Value::from(1.0)));
    assert!(decoded.get(2).unwrap().same(&Value::from(3.0)));
}

#[tokio::test]
async fn record_keeps_keys_with_undefined_values() {
    let record = Record::new();
    record.insert("foo", Value::Undefined);
    record.insert("", Value::from(1.0));

    let decoded = roundtrip(&Value::Record(record)).await;
    let Value::Record(decoded) = decoded else {
        panic!("expected a record");
    };
    assert!(decoded.contains_key("foo"));
    assert!(decoded.get("foo").unwrap().same(&Value::Undefined));
    assert!(decoded.get("").unwrap().same(&Value::from(1.0)));
}

#[tokio::test]
async fn maps_and_sets_round_trip() {
    let key = Sequence::new();
    key.push(Value::from(1.0));
    let map = Map::new();
    map.insert(Value::Sequence(key), Value::from("by sequence"));
    map.insert(Value::from("plain"), Value::from(2.0));
    map.insert(Value::Number(f64::NAN), Value::from(3.0));

    let decoded = roundtrip(&Value::Map(map.clone())).await;
    assert!(decoded.structural_eq(&Value::Map(map)));

    let set = Set::new();
    set.insert(Value::from(1.0));
    set.insert(Value::from("a"));
    set.insert(Value::Sequence(Sequence::new()));

    let decoded = roundtrip(&Value::Set(set.clone())).await;
    assert!(decoded.structural_eq(&Value::Set(set)));
    let Value::Set(decoded) = decoded else {
        panic!("expected a set");
    };
    assert_eq!(decoded.len(), 3);
}

#[tokio::test]
async fn errors_round_trip() {
    let error = Value::Error(ErrorValue::new("TypeError", "x is not a function"));
    let decoded = roundtrip(&error).await;
    let Value::Error(decoded) = decoded else {
        panic!("expected an error");
    };
    assert_eq!(decoded.kind(), "TypeError");
    assert_eq!(decoded.message(), "x is not a function");
}

#[tokio::test]
async fn shared_children_decode_shared() {
    let shared = Sequence::new();
    shared.push(Value::from(1.0));
    let record = Record::new();
    record.insert("a", Value::Sequence(shared.clone()));
    record.insert("b", Value::Sequence(shared));

    let decoded = roundtrip(&Value::Record(record)).await;
    let Value::Record(decoded) = decoded else {
        panic!("expected a record");
    };
    let a = decoded.get("a").unwrap();
    let b = decoded.get("b").unwrap();
    assert!(a.same(&b));
}

#[tokio::test]
async fn self_referential_record_round_trips() {
    let record = Record::new();
    record.insert("self", Value::Record(record.clone()));

    let decoded = roundtrip(&Value::Record(record)).await;
    let Value::Record(root) = &decoded else {
        panic!("expected a record");
    };
    assert!(root.get("self").unwrap().same(&decoded));
}

#[tokio::test]
async fn self_containing_sequence_round_trips() {
    let sequence = Sequence::new();
    sequence.push(Value::Sequence(sequence.clone()));
    sequence.push(Value::from(2.0));

    let decoded = roundtrip(&Value::Sequence(sequence)).await;
    let Value::Sequence(root) = &decoded else {
        panic!("expected a sequence");
    };
    assert_eq!(root.len(), 2);
    assert!(root.get(0).unwrap().same(&decoded));
}

#[tokio::test]
async fn map_with_itself_as_key_round_trips() {
    let map = Map::new();
    map.insert(Value::Map(map.clone()), Value::from("loop"));

    let decoded = roundtrip(&Value::Map(map)).await;
    let Value::Map(root) = &decoded else {
        panic!("expected a map");
    };
    assert_eq!(root.len(), 1);
    assert!(root.get(&decoded).unwrap().same(&Value::from("loop")));
}

struct PointEncoder {
    invocations: Arc<AtomicUsize>,
}

impl EncodePlugin for PointEncoder {
    fn replace(&self, value: &Value) -> Result<Option<Replacement>, PluginError> {
        match value {
            Value::Custom(custom) if custom.tag() == "Point" => {
                self.invocations.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Replacement::new("Point", custom.fields())))
            }
            _ => Ok(None),
        }
    }
}

struct PointDecoder;

impl DecodePlugin for PointDecoder {
    fn revive(&self, tag: &str, fields: &[Value]) -> Result<Option<Value>, PluginError> {
        if tag != "Point" {
            return Ok(None);
        }
        Ok(Some(Value::Custom(CustomValue::new("Point", fields.to_vec()))))
    }
}

#[tokio::test]
async fn plugins_round_trip_custom_values_once_per_instance() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let point = CustomValue::new("Point", vec![Value::from(3.0), Value::from(4.0)]);
    let record = Record::new();
    record.insert("p", Value::Custom(point.clone()));
    record.insert("q", Value::Custom(point));

    let encode_options = EncodeOptions {
        plugins: vec![Box::new(PointEncoder {
            invocations: Arc::clone(&invocations),
        })],
        ..Default::default()
    };
    let decode_options = DecodeOptions {
        plugins: vec![Box::new(PointDecoder)],
        ..Default::default()
    };
    let decoded = roundtrip_with(&Value::Record(record), encode_options, decode_options).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    let Value::Record(decoded) = decoded else {
        panic!("expected a record");
    };
    let p = decoded.get("p").unwrap();
    assert!(p.same(&decoded.get("q").unwrap()));
    let Value::Custom(p) = p else {
        panic!("expected a custom value");
    };
    assert_eq!(p.tag(), "Point");
    assert!(p.fields()[0].same(&Value::from(3.0)));
    assert!(p.fields()[1].same(&Value::from(4.0)));
}

#[tokio::test]
async fn unclaimed_custom_value_fails_encoding() {
    let custom = Value::Custom(CustomValue::new("Mystery", Vec::new()));
    let mut cursor = Cursor::new(Vec::new());
    let error = encode(&custom, &mut cursor, EncodeOptions::default())
        .await
        .expect_err("encoding should fail");
    assert!(matches!(
        error,
        EncodeError::UnsupportedValue { tag } if tag == "Mystery"
    ));
}

#[tokio::test]
async fn unclaimed_custom_tag_fails_decoding() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let point = Value::Custom(CustomValue::new("Point", vec![Value::from(1.0)]));
    let options = EncodeOptions {
        plugins: vec![Box::new(PointEncoder { invocations })],
        ..Default::default()
    };
    let bytes = encode_to_vec(&point, options).await;

    let error = decode(Cursor::new(bytes), DecodeOptions::default())
        .await
        .expect_err("decoding should fail");
    assert!(matches!(error, DecodeError::UnknownTag(tag) if tag == "Point"));
}

#[tokio::test]
async fn fulfilled_deferred_round_trips() {
    let root = Value::Deferred(Deferred::fulfilled(Value::from(42.0)));
    let bytes = encode_to_vec(&root, EncodeOptions::default()).await;
    assert_eq!(frame_count(&bytes), 2);
    assert!(bytes.starts_with(b"["), "root frame must come first");

    let decoded = decode(Cursor::new(bytes), DecodeOptions::default())
        .await
        .expect("decoding should succeed");
    let Value::Deferred(placeholder) = decoded.value.clone() else {
        panic!("expected a deferred");
    };
    decoded.done.await.expect("stream should finish cleanly");

    match placeholder.settled().await {
        Settlement::Fulfilled(value) => assert!(value.same(&Value::from(42.0))),
        Settlement::Rejected(reason) => panic!("unexpected rejection: {reason:?}"),
    }
}

#[tokio::test]
async fn rejected_deferred_round_trips() {
    let reason = Value::Error(ErrorValue::new("Oops", "it broke"));
    let root = Value::Deferred(Deferred::rejected(reason));
    let decoded = roundtrip(&root).await;
    let Value::Deferred(placeholder) = decoded else {
        panic!("expected a deferred");
    };

    match placeholder.settled().await {
        Settlement::Rejected(Value::Error(error)) => {
            assert_eq!(error.kind(), "Oops");
            assert_eq!(error.message(), "it broke");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn shared_deferred_settles_both_references() {
    let deferred = Deferred::pending();
    let record = Record::new();
    record.insert("a", Value::Deferred(deferred.clone()));
    record.insert("b", Value::Deferred(deferred.clone()));
    let root = Value::Record(record);

    let encoder = tokio::spawn(async move {
        let mut cursor = Cursor::new(Vec::new());
        encode(&root, &mut cursor, EncodeOptions::default())
            .await
            .expect("encoding should succeed");
        cursor.into_inner()
    });
    tokio::task::yield_now().await;
    deferred.fulfill(Value::from(7.0)).expect("should settle");
    let bytes = encoder.await.expect("encoder task should finish");
    assert_eq!(frame_count(&bytes), 2, "one frame settles both references");

    let decoded = decode(Cursor::new(bytes), DecodeOptions::default())
        .await
        .expect("decoding should succeed");
    let Value::Record(decoded_record) = decoded.value.clone() else {
        panic!("expected a record");
    };
    let a = decoded_record.get("a").unwrap();
    let b = decoded_record.get("b").unwrap();
    assert!(a.same(&b), "both keys must hold the same placeholder");

    decoded.done.await.expect("stream should finish cleanly");
    let Value::Deferred(placeholder) = a else {
        panic!("expected a deferred");
    };
    match placeholder.settled().await {
        Settlement::Fulfilled(value) => assert!(value.same(&Value::from(7.0))),
        other => panic!("expected fulfillment, got {other:?}"),
    }
}

#[tokio::test]
async fn nested_deferreds_settle_across_frames() {
    let inner = Deferred::pending();
    let payload = Record::new();
    payload.insert("inner", Value::Deferred(inner.clone()));
    let outer = Deferred::pending();
    outer
        .fulfill(Value::Record(payload))
        .expect("should settle");
    inner.fulfill(Value::from(5.0)).expect("should settle");

    let bytes = encode_to_vec(&Value::Deferred(outer), EncodeOptions::default()).await;
    assert_eq!(frame_count(&bytes), 3);

    let decoded = decode(Cursor::new(bytes), DecodeOptions::default())
        .await
        .expect("decoding should succeed");
    decoded.done.await.expect("stream should finish cleanly");

    let Value::Deferred(placeholder) = decoded.value else {
        panic!("expected a deferred");
    };
    let Settlement::Fulfilled(Value::Record(record)) = placeholder.settled().await else {
        panic!("expected a fulfilled record");
    };
    let Value::Deferred(inner) = record.get("inner").unwrap() else {
        panic!("expected a nested deferred");
    };
    match inner.settled().await {
        Settlement::Fulfilled(value) => assert!(value.same(&Value::from(5.0))),
        other => panic!("expected fulfillment, got {other:?}"),
    }
}

#[tokio::test]
async fn placeholder_is_observable_before_its_frame_arrives() {
    let (mut sender, receiver) = tokio::io::duplex(1024);
    sender
        .write_all(b"[[12,0]]\n")
        .await
        .expect("should write");

    let decoded = decode(receiver.compat(), DecodeOptions::default())
        .await
        .expect("decoding should succeed");
    let Value::Deferred(placeholder) = decoded.value.clone() else {
        panic!("expected a deferred");
    };
    assert!(placeholder.is_pending());

    let done = tokio::spawn(decoded.done);
    sender
        .write_all(b"+0:[\"later\"]\n")
        .await
        .expect("should write");

    match placeholder.settled().await {
        Settlement::Fulfilled(value) => assert!(value.same(&Value::from("later"))),
        other => panic!("expected fulfillment, got {other:?}"),
    }

    drop(sender);
    done.await.expect("task should finish").expect("stream should finish cleanly");
}

#[tokio::test]
async fn clean_eof_rejects_pending_placeholders() {
    let decoded = decode(Cursor::new(b"[[12,0]]\n".to_vec()), DecodeOptions::default())
        .await
        .expect("decoding should succeed");
    let Value::Deferred(placeholder) = decoded.value.clone() else {
        panic!("expected a deferred");
    };

    decoded
        .done
        .await
        .expect("the call completes normally; only placeholders reject");
    match placeholder.settled().await {
        Settlement::Rejected(Value::Error(error)) => {
            assert_eq!(error.kind(), "ClosedWithoutResolution");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn decoder_cancellation_rejects_placeholders() {
    let (mut sender, receiver) = tokio::io::duplex(1024);
    sender
        .write_all(b"[[12,0]]\n")
        .await
        .expect("should write");

    let token = CancellationToken::new();
    let options = DecodeOptions {
        signal: Some(token.clone()),
        ..Default::default()
    };
    let decoded = decode(receiver.compat(), options)
        .await
        .expect("decoding should succeed");
    let Value::Deferred(placeholder) = decoded.value.clone() else {
        panic!("expected a deferred");
    };

    let done = tokio::spawn(decoded.done);
    token.cancel();

    match placeholder.settled().await {
        Settlement::Rejected(Value::Error(error)) => assert_eq!(error.kind(), "Cancelled"),
        other => panic!("expected a rejection, got {other:?}"),
    }
    let result = done.await.expect("task should finish");
    assert!(matches!(result, Err(DecodeError::Cancelled)));
}

#[tokio::test]
async fn encoder_cancellation_emits_rejection_frames() {
    let deferred = Deferred::pending();
    let record = Record::new();
    record.insert("later", Value::Deferred(deferred.clone()));
    let root = Value::Record(record);

    let token = CancellationToken::new();
    let encoder = tokio::spawn({
        let token = token.clone();
        async move {
            let mut cursor = Cursor::new(Vec::new());
            encode(
                &root,
                &mut cursor,
                EncodeOptions {
                    signal: Some(token),
                    ..Default::default()
                },
            )
            .await
            .expect("encoding should succeed");
            cursor.into_inner()
        }
    });
    tokio::task::yield_now().await;
    token.cancel();
    let bytes = encoder.await.expect("encoder task should finish");

    let text = String::from_utf8(bytes.clone()).expect("stream is UTF-8");
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with('['));
    assert!(lines.next().unwrap().starts_with("-1:"));

    // The sender-side handle was rejected too.
    assert!(matches!(deferred.settlement(), Some(Settlement::Rejected(_))));

    let decoded = decode(Cursor::new(bytes), DecodeOptions::default())
        .await
        .expect("decoding should succeed");
    decoded.done.await.expect("stream should finish cleanly");
    let Value::Record(decoded_record) = decoded.value else {
        panic!("expected a record");
    };
    let Value::Deferred(placeholder) = decoded_record.get("later").unwrap() else {
        panic!("expected a deferred");
    };
    match placeholder.settled().await {
        Settlement::Rejected(Value::Error(error)) => assert_eq!(error.kind(), "Cancelled"),
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn golden_wire_frames() {
    let record = Record::new();
    record.insert("n", Value::from(1.5));
    record.insert("s", Value::from("x"));
    let bytes = encode_to_vec(&Value::Record(record), EncodeOptions::default()).await;
    assert_eq!(bytes, b"[[2,[\"n\",1,\"s\",2]],1.5,\"x\"]\n");

    let bytes = encode_to_vec(&Value::Undefined, EncodeOptions::default()).await;
    assert_eq!(bytes, b"[[0,-1]]\n");

    let sequence = Sequence::new();
    sequence.push(Value::from(1.0));
    sequence.push_hole();
    sequence.push(Value::from(3.0));
    let bytes = encode_to_vec(&Value::Sequence(sequence), EncodeOptions::default()).await;
    assert_eq!(bytes, b"[[1,[1,-10,2]],1.0,3.0]\n");
}

#[tokio::test]
async fn root_frame_failures_fail_the_call() {
    for (input, expectation) in [
        (&b"bogus\n"[..], "malformed"),
        (&b"[]\n"[..], "malformed"),
        (&b"+0:[1.0]\n"[..], "malformed"),
        (&b""[..], "malformed"),
        (&b"[[1,[5]]]\n"[..], "unknown reference"),
    ] {
        let result = decode(Cursor::new(input.to_vec()), DecodeOptions::default()).await;
        match (result, expectation) {
            (Err(DecodeError::MalformedFrame(_)), "malformed") => {}
            (Err(DecodeError::UnknownReference(5)), "unknown reference") => {}
            (other, _) => panic!("unexpected outcome for {input:?}: {other:?}"),
        }
    }
}

#[tokio::test]
async fn post_root_failures_surface_on_done_and_placeholders() {
    // A resolution frame for an index that is not pending.
    let decoded = decode(
        Cursor::new(b"[\"root\"]\n+0:[\"stray\"]\n".to_vec()),
        DecodeOptions::default(),
    )
    .await
    .expect("root should decode");
    let result = decoded.done.await;
    assert!(matches!(result, Err(DecodeError::UnexpectedResolution(0))));

    // Garbage after the root rejects pending placeholders with a decode
    // failure and errors the done future.
    let decoded = decode(
        Cursor::new(b"[[12,0]]\ngarbage\n".to_vec()),
        DecodeOptions::default(),
    )
    .await
    .expect("root should decode");
    let Value::Deferred(placeholder) = decoded.value.clone() else {
        panic!("expected a deferred");
    };
    let result = decoded.done.await;
    assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));
    match placeholder.settled().await {
        Settlement::Rejected(Value::Error(error)) => assert_eq!(error.kind(), "Decode"),
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn resolution_value_may_contain_its_own_placeholder() {
    // A deferred that resolves to a record holding the deferred itself.
    let decoded = decode(
        Cursor::new(b"[[12,0]]\n+0:[[2,[\"me\",1]],[12,0]]\n".to_vec()),
        DecodeOptions::default(),
    )
    .await
    .expect("decoding should succeed");
    let Value::Deferred(placeholder) = decoded.value.clone() else {
        panic!("expected a deferred");
    };
    decoded.done.await.expect("stream should finish cleanly");

    let Settlement::Fulfilled(Value::Record(record)) = placeholder.settled().await else {
        panic!("expected a fulfilled record");
    };
    let Value::Deferred(inner) = record.get("me").unwrap() else {
        panic!("expected a deferred");
    };
    assert_eq!(inner.heap_id(), placeholder.heap_id());
}
