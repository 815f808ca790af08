//! Sequence records: derived `length`, truncation and element operations.

use parking_lot::Mutex;
use record_observe::{
    deliver_change_records, observe, pop, push, shift, splice, unshift, Callback, ChangeBatch,
    DescriptorPatch, Getter, ObserveError, Record,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Records every batch delivered to its callback.
struct Recorder {
    callback: Callback,
    batches: Arc<Mutex<Vec<ChangeBatch>>>,
}

impl Recorder {
    fn observing(records: &[&Record]) -> Self {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let callback = Callback::new(move |batch| sink.lock().push(batch));
        for record in records {
            observe(*record, &callback).unwrap();
        }
        Self { callback, batches }
    }

    /// Deliver once and return `(record, json)` pairs of the batch.
    fn deliver(&self) -> Vec<(Record, Value)> {
        deliver_change_records(&self.callback).unwrap();
        let batches = self.batches.lock();
        assert_eq!(batches.len(), 1, "expected exactly one delivery");
        batches[0]
            .iter()
            .map(|change| (change.object.clone(), change.to_json()))
            .collect()
    }

    /// Deliver once, checking every record belongs to `record`.
    fn deliver_for(&self, record: &Record) -> Vec<Value> {
        self.deliver()
            .into_iter()
            .map(|(object, change)| {
                assert!(object.ptr_eq(record));
                change
            })
            .collect()
    }
}

fn change(name: &str, change_type: &str) -> Value {
    json!({"name": name, "type": change_type})
}

fn change_from(name: &str, change_type: &str, old_value: Value) -> Value {
    json!({"name": name, "type": change_type, "oldValue": old_value})
}

fn array(items: Value) -> Record {
    Record::from_json(items).unwrap()
}

// --- length ---

#[test]
fn test_length_truncation() {
    let arr = array(json!(["a", "b", "c", "d"]));
    let arr2 = array(json!(["alpha", "beta"]));
    let arr3 = array(json!(["hello"]));
    arr3.set("2", "goodbye").unwrap();
    arr3.set("length", 6).unwrap();

    arr.define("0", DescriptorPatch::new().with_configurable(false))
        .unwrap();
    arr.define("2", DescriptorPatch::getter(Getter::new(|| Value::Null)))
        .unwrap();
    arr2.define(
        "0",
        DescriptorPatch::getter(Getter::new(|| Value::Null)).with_configurable(false),
    )
    .unwrap();

    let recorder = Recorder::observing(&[&arr, &arr2, &arr3]);
    arr.set("length", 2).unwrap();
    arr.set("length", 0).unwrap();
    arr.set("length", 10).unwrap();
    arr2.set("length", 0).unwrap();
    arr2.set("length", 1).unwrap();
    arr3.set("length", 0).unwrap();
    arr3.define("length", DescriptorPatch::value(5)).unwrap();
    arr3.define("length", DescriptorPatch::value(10).with_writable(false))
        .unwrap();

    let delivered = recorder.deliver();
    let expected = vec![
        (&arr, change_from("3", "deleted", json!("d"))),
        (&arr, change_from("2", "deleted", Value::Null)),
        (&arr, change_from("length", "updated", json!(4))),
        (&arr, change_from("1", "deleted", json!("b"))),
        (&arr, change_from("length", "updated", json!(2))),
        (&arr, change_from("length", "updated", json!(1))),
        (&arr2, change_from("1", "deleted", json!("beta"))),
        (&arr2, change_from("length", "updated", json!(2))),
        (&arr3, change_from("2", "deleted", json!("goodbye"))),
        (&arr3, change_from("0", "deleted", json!("hello"))),
        (&arr3, change_from("length", "updated", json!(6))),
        (&arr3, change_from("length", "updated", json!(0))),
        (&arr3, change_from("length", "updated", json!(5))),
        (&arr3, change("length", "reconfigured")),
    ];
    assert_eq!(delivered.len(), expected.len());
    for ((object, actual), (record, wanted)) in delivered.iter().zip(&expected) {
        assert!(object.ptr_eq(record));
        assert_eq!(actual, wanted);
    }

    assert_eq!(arr.get("length"), Some(json!(10)));
    assert_eq!(arr2.get("length"), Some(json!(1)));
    assert!(!arr3.descriptor("length").unwrap().is_writable());
}

#[test]
fn test_elements_past_the_end_grow_length() {
    let arr = array(json!([1, 2, 3]));
    let recorder = Recorder::observing(&[&arr]);

    arr.set("3", 10).unwrap();
    arr.set("100", 20).unwrap();
    arr.define("200", DescriptorPatch::value(7)).unwrap();
    arr.define("400", DescriptorPatch::getter(Getter::new(|| Value::Null)))
        .unwrap();
    arr.set("50", 30).unwrap();

    assert_eq!(
        recorder.deliver_for(&arr),
        vec![
            change("3", "new"),
            change_from("length", "updated", json!(3)),
            change("100", "new"),
            change_from("length", "updated", json!(4)),
            change("200", "new"),
            change_from("length", "updated", json!(101)),
            change("400", "new"),
            change_from("length", "updated", json!(201)),
            change("50", "new"),
        ]
    );
    assert_eq!(arr.get("length"), Some(json!(401)));
}

#[test]
fn test_read_only_length_refuses_growth() {
    let arr = array(json!([1]));
    arr.define("length", DescriptorPatch::new().with_writable(false))
        .unwrap();
    let recorder = Recorder::observing(&[&arr]);

    assert!(!arr.set("1", 2).unwrap());
    assert!(!arr.set("length", 0).unwrap());
    assert!(matches!(
        arr.define("5", DescriptorPatch::value(1)),
        Err(ObserveError::CannotRedefine(_))
    ));
    assert!(arr.set("0", 9).unwrap());

    assert_eq!(
        recorder.deliver_for(&arr),
        vec![change_from("0", "updated", json!(1))]
    );
}

#[test]
fn test_invalid_lengths_rejected() {
    let arr = array(json!([]));
    for bad in [json!(-1), json!(1.5), json!("3"), json!(4294967296u64)] {
        assert!(matches!(
            arr.set("length", bad),
            Err(ObserveError::InvalidLength(_))
        ));
    }
    assert_eq!(arr.get("length"), Some(json!(0)));
}

#[test]
fn test_operations_at_maximum_length_fail_cleanly() {
    let seq = Record::sequence(Vec::new());
    seq.set("length", u32::MAX).unwrap();
    let plain = array(json!({"length": u32::MAX}));
    let recorder = Recorder::observing(&[&seq, &plain]);

    for record in [&seq, &plain] {
        assert!(matches!(
            push(record, [json!(1)]),
            Err(ObserveError::InvalidLength(_))
        ));
        assert!(matches!(
            unshift(record, vec![json!(1)]),
            Err(ObserveError::InvalidLength(_))
        ));
        assert!(matches!(
            splice(record, 0, 0, vec![json!(1)]),
            Err(ObserveError::InvalidLength(_))
        ));
        assert_eq!(record.get("length"), Some(json!(u32::MAX)));
        assert!(!record.has("0"));
    }

    // Nothing was written, so nothing is pending.
    assert!(!deliver_change_records(&recorder.callback).unwrap());
}

#[test]
fn test_push_up_to_maximum_length() {
    let seq = Record::sequence(Vec::new());
    seq.set("length", u32::MAX - 1).unwrap();
    let recorder = Recorder::observing(&[&seq]);

    assert_eq!(push(&seq, [json!("last")]).unwrap(), u32::MAX);
    assert_eq!(
        recorder.deliver_for(&seq),
        vec![
            change("4294967294", "new"),
            change_from("length", "updated", json!(u32::MAX - 1)),
        ]
    );
}

// --- operations on sequences ---

#[test]
fn test_push_on_sequence() {
    let arr = array(json!([1, 2]));
    let recorder = Recorder::observing(&[&arr]);
    assert_eq!(push(&arr, [json!(3), json!(4)]).unwrap(), 4);

    assert_eq!(
        recorder.deliver_for(&arr),
        vec![
            change("2", "new"),
            change_from("length", "updated", json!(2)),
            change("3", "new"),
            change_from("length", "updated", json!(3)),
        ]
    );
}

#[test]
fn test_pop_on_sequence() {
    let arr = array(json!([1, 2]));
    let recorder = Recorder::observing(&[&arr]);
    assert_eq!(pop(&arr).unwrap(), Some(json!(2)));
    assert_eq!(pop(&arr).unwrap(), Some(json!(1)));

    assert_eq!(
        recorder.deliver_for(&arr),
        vec![
            change_from("1", "deleted", json!(2)),
            change_from("length", "updated", json!(2)),
            change_from("0", "deleted", json!(1)),
            change_from("length", "updated", json!(1)),
        ]
    );
}

#[test]
fn test_shift_on_sequence() {
    let arr = array(json!([1, 2]));
    let recorder = Recorder::observing(&[&arr]);
    assert_eq!(shift(&arr).unwrap(), Some(json!(1)));
    assert_eq!(shift(&arr).unwrap(), Some(json!(2)));

    assert_eq!(
        recorder.deliver_for(&arr),
        vec![
            change_from("0", "updated", json!(1)),
            change_from("1", "deleted", json!(2)),
            change_from("length", "updated", json!(2)),
            change_from("0", "deleted", json!(2)),
            change_from("length", "updated", json!(1)),
        ]
    );
}

#[test]
fn test_unshift_on_sequence() {
    let arr = array(json!([1, 2]));
    let recorder = Recorder::observing(&[&arr]);
    assert_eq!(unshift(&arr, vec![json!(3), json!(4)]).unwrap(), 4);

    assert_eq!(
        recorder.deliver_for(&arr),
        vec![
            change("3", "new"),
            change_from("length", "updated", json!(2)),
            change("2", "new"),
            change_from("0", "updated", json!(1)),
            change_from("1", "updated", json!(2)),
        ]
    );
}

#[test]
fn test_splice_on_sequence() {
    let arr = array(json!([1, 2, 3]));
    let recorder = Recorder::observing(&[&arr]);
    let removed = splice(&arr, 1, 1, vec![json!(4), json!(5)]).unwrap();
    assert_eq!(removed, vec![json!(2)]);

    assert_eq!(
        recorder.deliver_for(&arr),
        vec![
            change("3", "new"),
            change_from("length", "updated", json!(3)),
            change_from("1", "updated", json!(2)),
            change_from("2", "updated", json!(3)),
        ]
    );
}

// --- the same operations on plain records with a length attribute ---

#[test]
fn test_push_on_plain_record() {
    let obj = array(json!({"0": 1, "1": 2, "length": 2}));
    let recorder = Recorder::observing(&[&obj]);
    push(&obj, [json!(3), json!(4)]).unwrap();

    assert_eq!(
        recorder.deliver_for(&obj),
        vec![
            change("2", "new"),
            change("3", "new"),
            change_from("length", "updated", json!(2)),
        ]
    );
}

#[test]
fn test_pop_on_plain_record() {
    let obj = array(json!({"0": 1, "1": 2, "length": 2}));
    let recorder = Recorder::observing(&[&obj]);
    pop(&obj).unwrap();
    pop(&obj).unwrap();

    assert_eq!(
        recorder.deliver_for(&obj),
        vec![
            change_from("1", "deleted", json!(2)),
            change_from("length", "updated", json!(2)),
            change_from("0", "deleted", json!(1)),
            change_from("length", "updated", json!(1)),
        ]
    );
}

#[test]
fn test_shift_on_plain_record() {
    let obj = array(json!({"0": 1, "1": 2, "length": 2}));
    let recorder = Recorder::observing(&[&obj]);
    shift(&obj).unwrap();
    shift(&obj).unwrap();

    assert_eq!(
        recorder.deliver_for(&obj),
        vec![
            change_from("0", "updated", json!(1)),
            change_from("1", "deleted", json!(2)),
            change_from("length", "updated", json!(2)),
            change_from("0", "deleted", json!(2)),
            change_from("length", "updated", json!(1)),
        ]
    );
}

#[test]
fn test_unshift_on_plain_record() {
    let obj = array(json!({"0": 1, "1": 2, "length": 2}));
    let recorder = Recorder::observing(&[&obj]);
    unshift(&obj, vec![json!(3), json!(4)]).unwrap();

    assert_eq!(
        recorder.deliver_for(&obj),
        vec![
            change("3", "new"),
            change("2", "new"),
            change_from("0", "updated", json!(1)),
            change_from("1", "updated", json!(2)),
            change_from("length", "updated", json!(2)),
        ]
    );
}

#[test]
fn test_splice_on_plain_record() {
    let obj = array(json!({"0": 1, "1": 2, "2": 3, "length": 3}));
    let recorder = Recorder::observing(&[&obj]);
    splice(&obj, 1, 1, vec![json!(4), json!(5)]).unwrap();

    assert_eq!(
        recorder.deliver_for(&obj),
        vec![
            change("3", "new"),
            change_from("1", "updated", json!(2)),
            change_from("2", "updated", json!(3)),
            change_from("length", "updated", json!(3)),
        ]
    );
}

#[test]
fn test_pop_on_empty_plain_record_sets_length() {
    let obj = Record::new();
    let recorder = Recorder::observing(&[&obj]);
    assert_eq!(pop(&obj).unwrap(), None);

    assert_eq!(recorder.deliver_for(&obj), vec![change("length", "new")]);
}
