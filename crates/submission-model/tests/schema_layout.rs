use submission_model::{
    ColumnType, CompiledForm, ElementType, FieldKind, FieldSpec, FormDefinition, NewElement,
    PhysicalLocation, SchemaError, SchemaTree, StoreLimits, TableRole, compile,
};

fn leaf(name: &str, kind: FieldKind) -> FieldSpec {
    FieldSpec::leaf(name, kind)
}

fn string_leaf(name: &str) -> NewElement {
    NewElement {
        element_type: ElementType::String,
        element_name: Some(name.into()),
        location: PhysicalLocation::column(submission_model::TableId(0), name.to_uppercase()),
        max_length: Some(255),
    }
}

fn household() -> FormDefinition {
    FormDefinition::new(
        "household",
        FieldSpec::group(
            "data",
            vec![
                leaf("name", FieldKind::String),
                leaf("loc", FieldKind::Geopoint),
                FieldSpec::group("g", vec![leaf("inner", FieldKind::Integer)]),
                FieldSpec::repeat(
                    "members",
                    vec![leaf("age", FieldKind::Integer), leaf("photo", FieldKind::Binary)],
                ),
                leaf("colors", FieldKind::SelectN),
            ],
        ),
    )
    .with_versions(Some(3), None)
}

/// Core holds metadata plus two fields; anything after spills.
fn tight_limits() -> StoreLimits {
    StoreLimits {
        max_columns_per_table: 13,
        ..StoreLimits::default()
    }
}

fn wide_form(count: usize) -> FormDefinition {
    let fields = (0..count)
        .map(|index| leaf(&format!("f{index}"), FieldKind::String))
        .collect();
    FormDefinition::new("wide", FieldSpec::group("data", fields))
}

#[test]
fn validate_children_rejects_gaps() {
    let mut tree = SchemaTree::new("form", "submissions", "data", "FORM_CORE");
    let root = tree.root();
    tree.insert_element(root, 1, string_leaf("a"))
        .expect("insert first");
    tree.insert_element(root, 3, string_leaf("c"))
        .expect("insert third");

    let err = tree.validate_children(root).expect_err("gap at ordinal 2");
    assert_eq!(
        err,
        SchemaError::MissingOrdinal {
            element: "data".into(),
            ordinal: 2
        }
    );

    tree.insert_element(root, 2, string_leaf("b"))
        .expect("fill the gap");
    tree.validate().expect("dense children");
}

#[test]
fn insert_rejects_occupied_ordinal() {
    let mut tree = SchemaTree::new("form", "submissions", "data", "FORM_CORE");
    let root = tree.root();
    tree.insert_element(root, 1, string_leaf("a"))
        .expect("insert first");
    let err = tree
        .insert_element(root, 1, string_leaf("b"))
        .expect_err("slot taken");
    assert!(matches!(err, SchemaError::DuplicateOrdinal { ordinal: 1, .. }));
}

#[test]
fn compile_assigns_tables_and_columns() {
    let schema = compile(&household(), &StoreLimits::default()).expect("compile");
    let names: Vec<_> = schema
        .tables()
        .iter()
        .map(|table| (table.name.table.as_str(), table.role))
        .collect();
    assert_eq!(
        names,
        vec![
            ("HOUSEHOLD_CORE", TableRole::TopLevel),
            ("HOUSEHOLD_STRING_TXT", TableRole::LongString),
            ("HOUSEHOLD_MEMBERS", TableRole::Repeat),
            ("HOUSEHOLD_PHOTO_BN", TableRole::BinaryContent),
            ("HOUSEHOLD_PHOTO_REF", TableRole::BinaryContentRef),
            ("HOUSEHOLD_PHOTO_BLB", TableRole::RefBlob),
            ("HOUSEHOLD_COLORS", TableRole::SelectChoice),
        ]
    );

    let core = schema.table(schema.top_level_table());
    let columns: Vec<_> = core.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        columns,
        vec![
            "_MODEL_VERSION",
            "_UI_VERSION",
            "_SUBMISSION_DATE",
            "_IS_COMPLETE",
            "_MARKED_AS_COMPLETE_DATE",
            "NAME",
            "LOC_LAT",
            "LOC_LNG",
            "LOC_ALT",
            "LOC_ACC",
            "G_INNER",
        ]
    );
    assert_eq!(
        core.column("G_INNER").map(|c| c.column_type),
        Some(ColumnType::Integer)
    );

    let loc = schema
        .find_by_name(schema.root(), "loc")
        .expect("geopoint present");
    let loc = schema.element(loc);
    assert_eq!(loc.element_type, ElementType::GeoPoint);
    assert!(loc.location.column.is_none());
    assert_eq!(loc.children.len(), 4);
}

#[test]
fn group_qualified_names_follow_containers() {
    let schema = compile(&household(), &StoreLimits::default()).expect("compile");
    let root = schema.root();
    let g = schema.find_by_name(root, "g").expect("group");
    let inner = schema.find_by_name(g, "inner").expect("inner");
    let name = schema.find_by_name(root, "name").expect("name");
    let members = schema.find_by_name(root, "members").expect("repeat");
    let age = schema.find_by_name(members, "age").expect("age");

    assert_eq!(schema.group_qualified_name(inner).expect("name"), "g:inner");
    assert_eq!(
        schema.group_qualified_xpath_name(inner).expect("xpath"),
        "/data/g/inner"
    );
    assert_eq!(schema.group_qualified_name(name).expect("name"), "name");
    assert_eq!(
        schema.group_qualified_xpath_name(name).expect("xpath"),
        "/data/name"
    );
    assert_eq!(schema.group_qualified_name(age).expect("name"), "age");
    assert_eq!(schema.group_qualified_xpath_name(age).expect("xpath"), "age");
    assert_eq!(schema.group_qualified_name(root).expect("root"), "data");
}

#[test]
fn tight_limits_split_into_phantom_tables() {
    let schema = compile(&wide_form(5), &tight_limits()).expect("compile");
    let root = schema.element(schema.root());
    let kinds: Vec<_> = root
        .child_ids()
        .map(|id| schema.element(id).element_type)
        .collect();
    assert_eq!(
        kinds,
        vec![ElementType::String, ElementType::String, ElementType::Phantom]
    );

    let phantom = schema.element(*root.children.last().and_then(|c| c.as_ref()).expect("phantom"));
    let phantom_table = schema.table(phantom.location.table);
    assert_eq!(phantom_table.role, TableRole::Phantom);
    assert_eq!(phantom_table.name.table, "WIDE_CORE2");
    assert_eq!(phantom_table.parent, Some(schema.top_level_table()));
    let ordinals: Vec<_> = phantom
        .child_ids()
        .map(|id| schema.element(id).ordinal)
        .collect();
    assert_eq!(ordinals, vec![1, 2, 3]);

    let f4 = schema
        .find_by_name(schema.root(), "f4")
        .expect("found through phantom");
    assert_eq!(schema.element(f4).location.table, phantom.location.table);
    assert_eq!(schema.group_qualified_name(f4).expect("name"), "f4");
}

#[test]
fn phantoms_chain_when_a_split_table_fills_up() {
    let schema = compile(&wide_form(12), &tight_limits()).expect("compile");
    let phantoms = schema
        .tables()
        .iter()
        .filter(|table| table.role == TableRole::Phantom)
        .count();
    assert_eq!(phantoms, 2);
    for table in schema.tables() {
        assert!(table.column_count() <= 13 || table.role == TableRole::LongString);
    }
}

#[test]
fn limits_too_small_is_reported() {
    let limits = StoreLimits {
        max_columns_per_table: 6,
        ..StoreLimits::default()
    };
    let err = compile(&wide_form(1), &limits).expect_err("nothing fits");
    assert_eq!(err, SchemaError::LimitsTooSmall { field: "f0".into() });
}

#[test]
fn duplicate_column_names_are_suffixed() {
    let definition = FormDefinition::new(
        "dup",
        FieldSpec::group(
            "data",
            vec![
                FieldSpec::group("g", vec![leaf("x", FieldKind::String)]),
                leaf("g_x", FieldKind::String),
            ],
        ),
    );
    let schema = compile(&definition, &StoreLimits::default()).expect("compile");
    let core = schema.table(schema.top_level_table());
    assert!(core.column("G_X").is_some());
    assert!(core.column("G_X_2").is_some());
}

#[test]
fn definitions_are_validated() {
    let bad_name = FormDefinition::new(
        "form",
        FieldSpec::group("data", vec![leaf("1bad", FieldKind::String)]),
    );
    assert_eq!(
        compile(&bad_name, &StoreLimits::default()).expect_err("bad name"),
        SchemaError::InvalidName("1bad".into())
    );

    let not_group = FormDefinition::new("form", leaf("data", FieldKind::String));
    assert_eq!(
        compile(&not_group, &StoreLimits::default()).expect_err("root kind"),
        SchemaError::RootNotGroup("data".into())
    );

    let mut leaf_with_children = leaf("name", FieldKind::String);
    leaf_with_children.children.push(leaf("x", FieldKind::String));
    let children = FormDefinition::new("form", FieldSpec::group("data", vec![leaf_with_children]));
    assert_eq!(
        compile(&children, &StoreLimits::default()).expect_err("children"),
        SchemaError::ChildrenNotAllowed("name".into())
    );
}

#[test]
fn sibling_names_must_be_unique() {
    let twice = FormDefinition::new(
        "form",
        FieldSpec::group(
            "data",
            vec![
                FieldSpec::group(
                    "g",
                    vec![leaf("x", FieldKind::String), leaf("x", FieldKind::Integer)],
                ),
                leaf("y", FieldKind::String),
            ],
        ),
    );
    assert_eq!(
        compile(&twice, &StoreLimits::default()).expect_err("duplicate"),
        SchemaError::DuplicateName("x".into())
    );

    let cousins = FormDefinition::new(
        "form",
        FieldSpec::group(
            "data",
            vec![
                FieldSpec::group("a", vec![leaf("x", FieldKind::String)]),
                FieldSpec::group("b", vec![leaf("x", FieldKind::String)]),
            ],
        ),
    );
    compile(&cousins, &StoreLimits::default()).expect("same name under different parents");
}

#[test]
fn zero_limits_are_rejected_before_compiling() {
    let limits = StoreLimits {
        blob_chunk_bytes: 0,
        ..StoreLimits::default()
    };
    let err = compile(&household(), &limits).expect_err("zero chunk size");
    assert!(matches!(&err, SchemaError::InvalidLimits(reason) if reason.contains("blob_chunk_bytes")));

    let limits = StoreLimits {
        default_string_length: 0,
        ..StoreLimits::default()
    };
    assert!(matches!(
        CompiledForm::compile(&household(), &limits),
        Err(SchemaError::InvalidLimits(_))
    ));
}

#[test]
fn definition_parses_from_json() {
    let raw = r#"{
        "form_id": "household",
        "model_version": 2,
        "root": {
            "name": "data",
            "kind": "group",
            "children": [
                { "name": "name", "kind": "string", "max_length": 40 },
                { "name": "colors", "kind": "select_n" }
            ]
        }
    }"#;
    let definition = FormDefinition::from_json_str(raw).expect("parse");
    assert_eq!(definition.model_version, Some(2));
    assert_eq!(definition.ui_version, None);
    assert_eq!(definition.root.children[0].max_length, Some(40));
    assert_eq!(definition.root.children[1].kind, FieldKind::SelectN);

    let form = CompiledForm::compile(&definition, &StoreLimits::default()).expect("compile");
    assert_eq!(form.top_level_name(), "data");
    assert_eq!(form.version.model_version, Some(2));
}
