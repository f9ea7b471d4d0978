use submission_model::{FieldKind, FieldSpec, FormDefinition, StoreLimits, compile};
use submission_store::{
    AttachmentOutcome, AttachmentTables, BlobStore, InMemoryStore, NewAttachment,
    RelationalBlobStore, RelationalStore, RowKey, StoreError, content_hash,
};

fn attachment_tables(store: &InMemoryStore) -> AttachmentTables {
    let definition = FormDefinition::new(
        "photos",
        FieldSpec::group("data", vec![FieldSpec::leaf("photo", FieldKind::Binary)]),
    );
    let schema = compile(&definition, &StoreLimits::default()).expect("compile");
    for table in schema.tables() {
        store.declare_table(table).expect("declare");
    }
    let photo = schema
        .find_by_name(schema.root(), "photo")
        .expect("binary field");
    AttachmentTables::for_element(&schema, photo, 4).expect("binary tables")
}

fn jpeg(filename: &str, bytes: &[u8]) -> NewAttachment {
    NewAttachment {
        filename: Some(filename.into()),
        content_type: "image/jpeg".into(),
        bytes: bytes.to_vec(),
    }
}

#[test]
fn attachments_are_chunked_and_reassembled() {
    let store = InMemoryStore::new();
    let tables = attachment_tables(&store);
    let blobs = RelationalBlobStore::new(&store, tables.clone());
    let parent = RowKey::new("uuid:parent");

    let outcome = blobs
        .put_attachment(&parent, &parent, &jpeg("a.jpg", b"0123456789"), false)
        .expect("put");
    assert_eq!(outcome, AttachmentOutcome::CompletelyNewFile);
    assert_eq!(store.row_count(&tables.content_ref), 3);
    assert_eq!(store.row_count(&tables.blob), 3);

    assert_eq!(blobs.attachment_count(&parent).expect("count"), 1);
    let info = blobs.attachment(&parent, 1).expect("info");
    assert_eq!(info.filename.as_deref(), Some("a.jpg"));
    assert_eq!(info.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(info.content_length, Some(10));
    assert_eq!(info.content_hash, Some(content_hash(b"0123456789")));
    assert_eq!(
        blobs.attachment_bytes(&parent, 1).expect("bytes"),
        b"0123456789"
    );
}

#[test]
fn outcomes_follow_content_hashes() {
    let store = InMemoryStore::new();
    let blobs = RelationalBlobStore::new(&store, attachment_tables(&store));
    let parent = RowKey::new("uuid:parent");

    blobs
        .put_attachment(&parent, &parent, &jpeg("a.jpg", b"first"), false)
        .expect("put");
    let same = blobs
        .put_attachment(&parent, &parent, &jpeg("a.jpg", b"first"), false)
        .expect("same");
    assert_eq!(same, AttachmentOutcome::FileUnchanged);

    let refused = blobs
        .put_attachment(&parent, &parent, &jpeg("a.jpg", b"second"), false)
        .expect("refused");
    assert_eq!(refused, AttachmentOutcome::NewFileVersion);
    assert_eq!(blobs.attachment_bytes(&parent, 1).expect("bytes"), b"first");

    let replaced = blobs
        .put_attachment(&parent, &parent, &jpeg("a.jpg", b"second"), true)
        .expect("replaced");
    assert_eq!(replaced, AttachmentOutcome::NewFileVersion);
    assert_eq!(blobs.attachment_bytes(&parent, 1).expect("bytes"), b"second");

    let other = blobs
        .put_attachment(&parent, &parent, &jpeg("b.jpg", b"third"), false)
        .expect("other");
    assert_eq!(other, AttachmentOutcome::CompletelyNewFile);
    assert_eq!(blobs.attachment_count(&parent).expect("count"), 2);
    let found = blobs
        .find_by_filename(&parent, Some("b.jpg"))
        .expect("find")
        .expect("present");
    assert_eq!(found.ordinal, 2);
}

#[test]
fn delete_all_clears_every_table() {
    let store = InMemoryStore::new();
    let tables = attachment_tables(&store);
    let blobs = RelationalBlobStore::new(&store, tables.clone());
    let parent = RowKey::new("uuid:parent");
    blobs
        .put_attachment(&parent, &parent, &jpeg("a.jpg", b"abcdefgh"), false)
        .expect("put");
    assert_eq!(blobs.entity_keys(&parent).expect("keys").len(), 5);

    blobs.delete_all(&parent).expect("delete");
    assert_eq!(store.row_count(&tables.content), 0);
    assert_eq!(store.row_count(&tables.content_ref), 0);
    assert_eq!(store.row_count(&tables.blob), 0);
}

#[test]
fn gaps_in_attachment_ordinals_are_fatal() {
    let store = InMemoryStore::new();
    let tables = attachment_tables(&store);
    let blobs = RelationalBlobStore::new(&store, tables.clone());
    let parent = RowKey::new("uuid:parent");
    for name in ["a.jpg", "b.jpg"] {
        blobs
            .put_attachment(&parent, &parent, &jpeg(name, b"x"), false)
            .expect("put");
    }
    let first = blobs.attachment(&parent, 1).expect("first");
    let mut row = store.get_row(&tables.content, &first.key).expect("row");
    row.ordinal = Some(3);
    store.upsert(&row).expect("corrupt ordinal");

    let err = blobs.attachment_count(&parent).expect_err("gap");
    assert!(matches!(
        err,
        StoreError::EnumeratedElement {
            expected: 1,
            found: Some(2),
            ..
        }
    ));
}
