//! End-to-end read-side operations: listing, searching, relationship
//! traversal, and timeline queries through the kernel's query executor.
use smaragda::prelude::*;

async fn open_with_catalog() -> (tempfile::TempDir, Smaragda, Id, Id, Id) {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Smaragda::open(dir.path()).await.unwrap();
    let author_genus = kernel
        .registry()
        .define_entity_genus(
            "Author",
            None,
            vec![Attribute::new("name", AttrType::Text, true)],
            vec![StateDef {
                name: "active".into(),
                initial: true,
            }],
            vec![],
        )
        .unwrap();
    let book_genus = kernel
        .registry()
        .define_entity_genus(
            "Book",
            None,
            vec![Attribute::new("title", AttrType::Text, true)],
            vec![StateDef {
                name: "published".into(),
                initial: true,
            }],
            vec![],
        )
        .unwrap();
    let authored_genus = kernel
        .registry()
        .define_relationship_genus(
            "Authored",
            None,
            vec![
                RoleDef {
                    name: "author".into(),
                    genus_constraint: author_genus,
                    min: 1,
                    max: Some(1),
                },
                RoleDef {
                    name: "book".into(),
                    genus_constraint: book_genus,
                    min: 1,
                    max: Some(1),
                },
            ],
            vec![],
        )
        .unwrap();
    (dir, kernel, author_genus, book_genus, authored_genus)
}

#[tokio::test]
async fn list_entities_compact_filters_by_genus_and_predicate() {
    let (_dir, kernel, _author_genus, book_genus, _authored_genus) = open_with_catalog().await;
    kernel
        .mutator()
        .create_entity(
            book_genus,
            kernel.main_branch(),
            vec![("title".to_string(), AttributeValue::Text("Dune".into()))],
            None,
            None,
        )
        .await
        .unwrap();
    kernel
        .mutator()
        .create_entity(
            book_genus,
            kernel.main_branch(),
            vec![("title".to_string(), AttributeValue::Text("Hyperion".into()))],
            None,
            None,
        )
        .await
        .unwrap();

    let results = kernel
        .query()
        .list_entities(
            Some(book_genus),
            kernel.main_branch(),
            Some(&Filter::contains("title", "dune")),
            true,
        )
        .unwrap();
    assert_eq!(results.len(), 1);
    match &results[0] {
        smaragda::query::EntityListItem::Compact(c) => {
            assert_eq!(c.name.as_deref(), Some("Dune"));
        }
        _ => panic!("expected compact projection"),
    }
}

#[tokio::test]
async fn search_entities_matches_any_text_attribute_case_insensitively() {
    let (_dir, kernel, _author_genus, book_genus, _authored_genus) = open_with_catalog().await;
    kernel
        .mutator()
        .create_entity(
            book_genus,
            kernel.main_branch(),
            vec![("title".to_string(), AttributeValue::Text("Dune".into()))],
            None,
            None,
        )
        .await
        .unwrap();

    let results = kernel
        .query()
        .search_entities(kernel.main_branch(), "dune")
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn get_relationships_finds_links_by_role() {
    let (_dir, kernel, author_genus, book_genus, authored_genus) = open_with_catalog().await;
    let (author_id, _) = kernel
        .mutator()
        .create_entity(
            author_genus,
            kernel.main_branch(),
            vec![("name".to_string(), AttributeValue::Text("Herbert".into()))],
            None,
            None,
        )
        .await
        .unwrap();
    let (book_id, _) = kernel
        .mutator()
        .create_entity(
            book_genus,
            kernel.main_branch(),
            vec![("title".to_string(), AttributeValue::Text("Dune".into()))],
            None,
            None,
        )
        .await
        .unwrap();
    kernel
        .mutator()
        .create_relationship(
            authored_genus,
            kernel.main_branch(),
            vec![
                ("author".to_string(), vec![author_id]),
                ("book".to_string(), vec![book_id]),
            ],
            vec![],
            None,
        )
        .await
        .unwrap();

    let as_author = kernel
        .query()
        .get_relationships(author_id, Some("author"), kernel.main_branch())
        .unwrap();
    assert_eq!(as_author.len(), 1);

    let as_book = kernel
        .query()
        .get_relationships(book_id, Some("author"), kernel.main_branch())
        .unwrap();
    assert!(as_book.is_empty(), "book fills the 'book' role, not 'author'");
}

#[tokio::test]
async fn query_timeline_returns_only_intersecting_anchors_in_order() {
    let (_dir, kernel, _author_genus, book_genus, _authored_genus) = open_with_catalog().await;
    let (ancient_id, _) = kernel
        .mutator()
        .create_entity(book_genus, kernel.main_branch(), vec![], None, None)
        .await
        .unwrap();
    kernel
        .store()
        .append_tessella(
            ancient_id,
            kernel.main_branch(),
            TessellaType::TemporalAnchorSet {
                start_year: -300,
                end_year: -200,
            },
            "local",
        )
        .await
        .unwrap();

    let (modern_id, _) = kernel
        .mutator()
        .create_entity(book_genus, kernel.main_branch(), vec![], None, None)
        .await
        .unwrap();
    kernel
        .store()
        .append_tessella(
            modern_id,
            kernel.main_branch(),
            TessellaType::TemporalAnchorSet {
                start_year: 1960,
                end_year: 1965,
            },
            "local",
        )
        .await
        .unwrap();

    let results = kernel.query().query_timeline(-400, -100, kernel.main_branch()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, ancient_id);
}

#[tokio::test]
async fn get_history_diff_describes_each_recorded_change() {
    let (_dir, kernel, _author_genus, book_genus, _authored_genus) = open_with_catalog().await;
    let (book_id, _) = kernel
        .mutator()
        .create_entity(
            book_genus,
            kernel.main_branch(),
            vec![("title".to_string(), AttributeValue::Text("Dune".into()))],
            None,
            None,
        )
        .await
        .unwrap();

    let diffs = kernel.query().get_history(book_id, true);
    assert_eq!(diffs.len(), 2, "initial transition + one attribute set");
    for item in diffs {
        match item {
            smaragda::query::HistoryItem::Diff(entry) => assert!(!entry.change.is_empty()),
            _ => panic!("expected diff projection"),
        }
    }
}
