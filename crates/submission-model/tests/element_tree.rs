use submission_model::{
    CompiledForm, ElementKeyError, FieldKind, FieldSpec, FormDefinition, FormElement,
    FormElementKey, FormElementNamespace, FormElementType, FormElementVisitor, StoreLimits,
};

fn survey() -> FormDefinition {
    FormDefinition::new(
        "survey",
        FieldSpec::group(
            "data",
            vec![
                FieldSpec::leaf("a", FieldKind::String),
                FieldSpec::group("g", vec![FieldSpec::leaf("inner", FieldKind::Decimal)]),
                FieldSpec::repeat(
                    "r",
                    vec![
                        FieldSpec::leaf("x", FieldKind::String),
                        FieldSpec::leaf("y", FieldKind::Boolean),
                    ],
                ),
                FieldSpec::leaf("b", FieldKind::Geopoint),
            ],
        ),
    )
}

fn compiled(definition: &FormDefinition, limits: &StoreLimits) -> CompiledForm {
    CompiledForm::compile(definition, limits).expect("compile form")
}

#[derive(Default)]
struct Recorder {
    leaves: Vec<String>,
    enters: usize,
    leaves_groups: usize,
    descends: usize,
    ascends: usize,
    repeat_instances: usize,
    abort_at: Option<String>,
    abort_on_leaf: Option<usize>,
}

impl FormElementVisitor for Recorder {
    fn enter(&mut self, _element: &FormElement) -> bool {
        self.enters += 1;
        false
    }

    fn leave(&mut self, _element: &FormElement) {
        self.leaves_groups += 1;
    }

    fn descend_into_repeat(&mut self, _element: &FormElement, ordinal: usize) -> bool {
        if ordinal > self.repeat_instances {
            return false;
        }
        self.descends += 1;
        true
    }

    fn ascend_from_repeat(&mut self, _element: &FormElement, _ordinal: usize) {
        self.ascends += 1;
    }

    fn traverse(&mut self, element: &FormElement) -> bool {
        self.leaves.push(element.name.clone());
        self.abort_at.as_deref() == Some(element.name.as_str())
            || self.abort_on_leaf == Some(self.leaves.len())
    }
}

#[test]
fn metadata_precedes_values_at_the_root() {
    let form = compiled(&survey(), &StoreLimits::default());
    let tree = &form.elements;
    let names: Vec<_> = tree
        .element(tree.root())
        .children
        .iter()
        .map(|id| tree.element(*id).name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "*meta-instance-id*",
            "*meta-model-version*",
            "*meta-ui-version*",
            "*meta-submission-date*",
            "*meta-is-complete*",
            "*meta-date-marked-as-complete*",
            "a",
            "g",
            "r",
            "b",
        ]
    );

    let values = tree.children(tree.root(), &[FormElementNamespace::Values]);
    assert_eq!(values.len(), 4);
    let metadata = tree.children(tree.root(), &[FormElementNamespace::Metadata]);
    assert_eq!(metadata.len(), 6);
    assert!(metadata.iter().all(|id| tree.element(*id).is_metadata()));
    assert_eq!(tree.children(tree.root(), &[]).len(), 10);
    assert_eq!(
        tree.children(
            tree.root(),
            &[FormElementNamespace::Values, FormElementNamespace::Metadata]
        )
        .len(),
        10
    );
}

#[test]
fn phantoms_are_never_exposed() {
    let fields = (0..9)
        .map(|index| FieldSpec::leaf(format!("f{index}"), FieldKind::Integer))
        .collect();
    let definition = FormDefinition::new("wide", FieldSpec::group("data", fields));
    let limits = StoreLimits {
        max_columns_per_table: 13,
        ..StoreLimits::default()
    };
    let form = compiled(&definition, &limits);
    assert!(
        form.schema
            .elements()
            .iter()
            .any(|element| element.is_phantom())
    );

    let mut recorder = Recorder::default();
    assert!(!form.elements.depth_first(&mut recorder));
    let expected: Vec<String> = submission_model::MetadataKind::ALL
        .iter()
        .map(|kind| kind.element_name().to_string())
        .chain((0..9).map(|index| format!("f{index}")))
        .collect();
    assert_eq!(recorder.leaves, expected);
    assert_eq!(recorder.enters, 1);
    assert_eq!(recorder.leaves_groups, 1);
}

#[test]
fn geopoints_and_groups_keep_their_shape() {
    let form = compiled(&survey(), &StoreLimits::default());
    let tree = &form.elements;
    let b = tree.find_child(tree.root(), "b").expect("geopoint");
    assert_eq!(tree.element(b).element_type, FormElementType::GeoPoint);
    assert!(tree.element(b).children.is_empty());

    let g = tree.find_child(tree.root(), "g").expect("group");
    let inner = tree.find_child(g, "inner").expect("inner");
    assert_eq!(tree.element(inner).group_qualified_name, "g:inner");
    assert!(tree.is_ancestor(g, inner));
    assert!(!tree.is_ancestor(inner, g));
}

#[test]
fn abort_keeps_frames_balanced() {
    let form = compiled(&survey(), &StoreLimits::default());
    let mut recorder = Recorder {
        repeat_instances: 3,
        abort_at: Some("y".into()),
        ..Recorder::default()
    };
    assert!(form.elements.depth_first(&mut recorder));
    assert_eq!(recorder.enters, 3);
    assert_eq!(recorder.leaves_groups, 3);
    assert_eq!(recorder.descends, 1);
    assert_eq!(recorder.ascends, 1);
    assert_eq!(recorder.leaves.last().map(String::as_str), Some("y"));
    assert!(!recorder.leaves.contains(&"b".to_string()));
}

#[test]
fn abort_on_second_leaf_stops_immediately() {
    let form = compiled(&survey(), &StoreLimits::default());
    let mut recorder = Recorder {
        abort_on_leaf: Some(2),
        ..Recorder::default()
    };
    assert!(form.elements.depth_first(&mut recorder));
    assert_eq!(recorder.leaves.len(), 2);
    assert_eq!(recorder.enters, recorder.leaves_groups);
}

#[test]
fn repeats_are_walked_once_per_instance() {
    let form = compiled(&survey(), &StoreLimits::default());
    let mut recorder = Recorder {
        repeat_instances: 2,
        ..Recorder::default()
    };
    assert!(!form.elements.depth_first(&mut recorder));
    assert_eq!(recorder.descends, 2);
    assert_eq!(recorder.ascends, 2);
    let xs = recorder.leaves.iter().filter(|name| *name == "x").count();
    assert_eq!(xs, 2);
}

#[test]
fn element_keys_resolve_back_to_elements() {
    let form = compiled(&survey(), &StoreLimits::default());
    let tree = &form.elements;
    let g = tree.find_child(tree.root(), "g").expect("group");
    let inner = tree.find_child(g, "inner").expect("inner");
    let r = tree.find_child(tree.root(), "r").expect("repeat");
    let x = tree.find_child(r, "x").expect("x");

    assert_eq!(tree.element_key(inner).as_str(), "survey/data/g:inner");
    assert_eq!(tree.element_key(x).as_str(), "survey/data/r/x");
    assert_eq!(tree.element_key(tree.root()).as_str(), "survey/data");

    for id in [tree.root(), g, inner, r, x] {
        let key = tree.element_key(id);
        assert_eq!(tree.resolve_key_path(&key).expect("resolve"), id);
    }
}

#[test]
fn malformed_element_keys_are_rejected() {
    let form = compiled(&survey(), &StoreLimits::default());
    let tree = &form.elements;

    let err = tree
        .resolve_key_path(&FormElementKey::new("other/data/a"))
        .expect_err("wrong form");
    assert!(matches!(err, ElementKeyError::WrongForm { .. }));

    let err = tree
        .resolve_key_path(&FormElementKey::new("survey/top/a"))
        .expect_err("wrong top group");
    assert_eq!(
        err,
        ElementKeyError::Malformed {
            key: "survey/top/a".into(),
            segment: "top".into()
        }
    );

    let err = tree
        .resolve_key_path(&FormElementKey::new("survey/data/g:missing"))
        .expect_err("missing child");
    assert!(matches!(err, ElementKeyError::Malformed { segment, .. } if segment == "missing"));
}
