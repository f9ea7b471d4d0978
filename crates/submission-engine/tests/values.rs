use std::str::FromStr;
use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use submission_engine::{
    DateTimeData, DateTimeKind, EngineError, FormRegistry, GeoPoint, ScalarKind, Submission,
    SubmissionValue,
};
use submission_model::{FieldKind, FieldSpec, FormDefinition, StoreLimits};
use submission_store::InMemoryStore;
use time::macros::{date, datetime, time};

const TRUTHY: [&str; 5] = ["true", "t", "ok", "yes", "y"];

fn survey() -> FormDefinition {
    FormDefinition::new(
        "survey",
        FieldSpec::group(
            "data",
            vec![
                FieldSpec::leaf("visited", FieldKind::Date),
                FieldSpec::leaf("arrived", FieldKind::Time),
                FieldSpec::leaf("started", FieldKind::DateTime),
                FieldSpec::leaf("weight", FieldKind::Decimal),
                FieldSpec::leaf("count", FieldKind::Integer),
                FieldSpec::leaf("consent", FieldKind::Boolean),
            ],
        ),
    )
}

fn submission() -> (InMemoryStore, Submission) {
    let store = InMemoryStore::new();
    let registry = FormRegistry::new(StoreLimits::default());
    let form = registry.register(&survey(), &store).expect("register");
    let submission = Submission::create(Arc::clone(&form), &store, None).expect("create");
    (store, submission)
}

fn date_time_of(submission: &Submission, name: &str) -> Option<DateTimeData> {
    submission
        .value_by_name(name)
        .and_then(SubmissionValue::as_date_time)
        .and_then(|value| value.value())
}

#[test]
fn boolean_tokens_fall_back_to_false() {
    for token in TRUTHY {
        assert_eq!(<bool as ScalarKind>::parse(token).expect("parse"), Some(true));
    }
    for token in ["TRUE", " Yes ", "Ok"] {
        assert_eq!(<bool as ScalarKind>::parse(token).expect("parse"), Some(true));
    }
    for token in ["false", "no", "1", "on", ""] {
        assert_eq!(<bool as ScalarKind>::parse(token).expect("parse"), Some(false));
    }
}

#[test]
fn numbers_parse_or_report_their_target() {
    assert_eq!(<i64 as ScalarKind>::parse(" 42 ").expect("parse"), Some(42));
    assert_eq!(<i64 as ScalarKind>::parse("").expect("parse"), None);
    assert!(matches!(
        <i64 as ScalarKind>::parse("4.2"),
        Err(EngineError::Conversion { target: "integer", .. })
    ));

    assert_eq!(
        <Decimal as ScalarKind>::parse("-12.50").expect("parse"),
        Some(Decimal::new(-1250, 2))
    );
    assert_eq!(
        <Decimal as ScalarKind>::parse("1.5e2").expect("parse"),
        Some(Decimal::from(150))
    );
    assert!(matches!(
        <Decimal as ScalarKind>::parse("heavy"),
        Err(EngineError::Conversion { target: "decimal", .. })
    ));
}

#[test]
fn geopoints_take_two_to_four_coordinates() {
    let point = GeoPoint::from_str("12.5 -3.25").expect("pair");
    assert_eq!(point.latitude, Decimal::new(125, 1));
    assert_eq!(point.longitude, Decimal::new(-325, 2));
    assert_eq!(point.altitude, None);
    assert_eq!(point.accuracy, None);

    let full = GeoPoint::from_str("1 2  300.5\t4").expect("full");
    assert_eq!(full.altitude, Some(Decimal::new(3005, 1)));
    assert_eq!(full.accuracy, Some(Decimal::from(4)));

    for raw in ["", "1", "1 2 3 4 5", "north 2"] {
        assert!(
            matches!(
                GeoPoint::from_str(raw),
                Err(EngineError::Conversion { target: "geopoint", .. })
            ),
            "{raw:?} should not parse"
        );
    }
}

#[test]
fn temporal_values_accept_offsets_and_local_forms() {
    let (_store, mut submission) = submission();
    let visited = submission.element_id("visited").expect("visited");
    let arrived = submission.element_id("arrived").expect("arrived");
    let started = submission.element_id("started").expect("started");

    submission
        .set_value_from_string(visited, "2024-02-29")
        .expect("date");
    assert_eq!(
        date_time_of(&submission, "visited"),
        Some(DateTimeData::Date(date!(2024 - 02 - 29)))
    );

    for raw in ["08:15:30", "08:15:30Z", "08:15:30+02:00", "08:15:30-05:00"] {
        submission.set_value_from_string(arrived, raw).expect("time");
        assert_eq!(
            date_time_of(&submission, "arrived"),
            Some(DateTimeData::Time(time!(8:15:30))),
            "{raw}"
        );
    }

    submission
        .set_value_from_string(started, "2024-05-01T10:00:00+02:00")
        .expect("offset");
    assert_eq!(
        date_time_of(&submission, "started"),
        Some(DateTimeData::DateTime(datetime!(2024-05-01 8:00:00 UTC)))
    );
    submission
        .set_value_from_string(started, "2024-05-01T10:00:00")
        .expect("local");
    assert_eq!(
        date_time_of(&submission, "started"),
        Some(DateTimeData::DateTime(datetime!(2024-05-01 10:00:00 UTC)))
    );

    submission.set_value_from_string(visited, "").expect("clear");
    assert_eq!(date_time_of(&submission, "visited"), None);
    assert!(matches!(
        submission.set_value_from_string(visited, "29/02/2024"),
        Err(EngineError::Conversion { target: "date", .. })
    ));
}

#[test]
fn date_time_values_keep_their_declared_kind() {
    let (_store, mut submission) = submission();
    let visited = submission.element_id("visited").expect("visited");
    let kind = submission
        .value_by_name("visited")
        .and_then(SubmissionValue::as_date_time)
        .map(|value| value.kind());
    assert_eq!(kind, Some(DateTimeKind::Date));
    assert!(matches!(
        submission.set_date_time(visited, Some(DateTimeData::Time(time!(12:00)))),
        Err(EngineError::IllegalState(_))
    ));
}

#[test]
fn typed_values_survive_a_store_round_trip() {
    let (store, mut submission) = submission();
    let weight = submission.element_id("weight").expect("weight");
    let count = submission.element_id("count").expect("count");
    let consent = submission.element_id("consent").expect("consent");
    submission
        .set_value_from_string(weight, "71.25")
        .expect("weight");
    submission.set_value_from_string(count, "3").expect("count");
    submission
        .set_value_from_string(consent, "Y")
        .expect("consent");
    submission.persist(&store).expect("persist");

    let loaded = Submission::load(
        Arc::clone(submission.form()),
        &store,
        submission.instance_id(),
    )
    .expect("load");
    assert_eq!(
        loaded
            .value_by_name("weight")
            .and_then(SubmissionValue::as_decimal)
            .and_then(|value| value.value()),
        Some(Decimal::new(7125, 2))
    );
    assert_eq!(
        loaded
            .value_by_name("count")
            .and_then(SubmissionValue::as_long)
            .and_then(|value| value.value()),
        Some(3)
    );
    assert_eq!(
        loaded
            .value_by_name("consent")
            .and_then(SubmissionValue::as_boolean)
            .and_then(|value| value.value()),
        Some(true)
    );
}

proptest! {
    #[test]
    fn integers_parse_from_their_decimal_rendering(number in any::<i64>()) {
        prop_assert_eq!(<i64 as ScalarKind>::parse(&number.to_string()).expect("parse"), Some(number));
    }

    #[test]
    fn unknown_tokens_read_as_false(token in "[a-z]{2,8}") {
        prop_assume!(!TRUTHY.contains(&token.as_str()));
        prop_assert_eq!(<bool as ScalarKind>::parse(&token).expect("parse"), Some(false));
    }
}
