use proptest::prelude::*;

use submission_model::{FormVersion, KeyError, SubmissionKey, SubmissionKeyPart};

fn version(model: Option<i64>, ui: Option<i64>) -> FormVersion {
    FormVersion {
        model_version: model,
        ui_version: ui,
    }
}

#[test]
fn key_renders_versions_keys_and_ordinals() {
    let key = SubmissionKey::from_parts(&[
        SubmissionKeyPart::form("household", version(Some(2), None)),
        SubmissionKeyPart::element("data").with_auri("uuid:1234"),
        SubmissionKeyPart::element("members").with_ordinal(2),
        SubmissionKeyPart::element("g:age"),
    ]);
    insta::assert_snapshot!(
        key.as_str(),
        @"household[@version=2 and @uiVersion=null]/data[@key=uuid:1234]/members[@ordinal=2]/g:age"
    );
}

#[test]
fn decoding_isolates_slashes_in_form_id_and_row_key() {
    let key = SubmissionKey::new(
        "org/forms/survey[@version=null and @uiVersion=7]/data[@key=uuid:a/b]/r[@ordinal=3]/x",
    );
    let parts = key.parts().expect("decode");
    assert_eq!(
        parts,
        vec![
            SubmissionKeyPart::form("org/forms/survey", version(None, Some(7))),
            SubmissionKeyPart::element("data").with_auri("uuid:a/b"),
            SubmissionKeyPart::element("r").with_ordinal(3),
            SubmissionKeyPart::element("x"),
        ]
    );
}

#[test]
fn quoted_values_are_unwrapped() {
    let key = SubmissionKey::new(r#"form[@version=1 and @uiVersion=1]/data[@key="uuid:abc"]"#);
    let parts = key.parts().expect("decode");
    assert_eq!(parts[1].auri.as_deref(), Some("uuid:abc"));
}

#[test]
fn plain_top_level_segment_is_split_on_slash() {
    let key = SubmissionKey::new("form[@version=1 and @uiVersion=null]/data/name");
    let parts = key.parts().expect("decode");
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[1], SubmissionKeyPart::element("data"));
    assert_eq!(parts[2], SubmissionKeyPart::element("name"));
}

#[test]
fn form_only_key_has_a_single_part() {
    let parts = SubmissionKey::new("form[@version=null and @uiVersion=null]")
        .parts()
        .expect("decode");
    assert_eq!(parts, vec![SubmissionKeyPart::form("form", FormVersion::default())]);
}

#[test]
fn illegal_keys_are_rejected() {
    let err = SubmissionKey::new("form/data[@key=uuid:1]")
        .parts()
        .expect_err("no version marker");
    assert!(matches!(err, KeyError::MissingVersionMarker(_)));

    let err = SubmissionKey::new("form[@version=1 and @uiVersion=1]/data[@ordinal=x]")
        .parts()
        .expect_err("bad ordinal");
    assert!(matches!(err, KeyError::MalformedSegment { segment, .. } if segment == "data[@ordinal=x]"));

    let err = SubmissionKey::new("form[@version=one and @uiVersion=1]")
        .parts()
        .expect_err("bad version");
    assert!(matches!(err, KeyError::MalformedSegment { .. }));

    let err = SubmissionKey::new("form[@version=1 and @uiVersion=1]/data[@key=uuid:1")
        .parts()
        .expect_err("unterminated");
    assert!(matches!(err, KeyError::Unterminated { .. }));

    let err = SubmissionKey::new("form[@version=1 and @uiVersion=1]/data[@name=x]")
        .parts()
        .expect_err("unknown condition");
    assert!(matches!(err, KeyError::MalformedSegment { .. }));
}

#[test]
fn child_and_ordinal_helpers_extend_keys() {
    let key = SubmissionKey::new("form[@version=1 and @uiVersion=1]/data[@key=uuid:1]")
        .child("photos")
        .with_ordinal(2)
        .child("photo");
    let parts = key.parts().expect("decode");
    assert_eq!(parts[2], SubmissionKeyPart::element("photos").with_ordinal(2));
    assert_eq!(parts[3], SubmissionKeyPart::element("photo"));
}

fn part_strategy() -> impl Strategy<Value = SubmissionKeyPart> {
    (
        "[a-z][a-z0-9_]{0,6}(:[a-z][a-z0-9_]{0,6})?",
        prop::option::of(1i64..50),
    )
        .prop_map(|(name, ordinal)| {
            let part = SubmissionKeyPart::element(name);
            match ordinal {
                Some(ordinal) => part.with_ordinal(ordinal),
                None => part,
            }
        })
}

proptest! {
    #[test]
    fn encoded_keys_decode_to_their_parts(
        form_id in "[a-z][a-z0-9_/.-]{0,12}",
        model in prop::option::of(-5i64..1_000),
        ui in prop::option::of(0i64..1_000),
        top in "[a-z][a-z0-9_]{0,8}",
        auri in "uuid:[a-z0-9/:-]{1,16}",
        rest in prop::collection::vec(part_strategy(), 0..4),
    ) {
        let mut parts = vec![
            SubmissionKeyPart::form(form_id, version(model, ui)),
            SubmissionKeyPart::element(top).with_auri(auri),
        ];
        parts.extend(rest);
        let key = SubmissionKey::from_parts(&parts);
        prop_assert_eq!(key.parts().expect("decode"), parts);
    }
}
