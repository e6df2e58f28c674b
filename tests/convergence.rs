//! End-to-end convergence: two replicas that ingest the same tessellae in
//! different arrival orders materialize to identical state, the guarantee
//! the canonical `(created_at, origin)` fold order exists to provide.
use smaragda::prelude::*;

#[tokio::test]
async fn replicas_converge_regardless_of_ingest_order() {
    let dir_a = tempfile::tempdir().unwrap();
    let kernel_a = Smaragda::open(dir_a.path()).await.unwrap();

    let genus = kernel_a
        .registry()
        .define_entity_genus(
            "Server",
            None,
            vec![Attribute::new("hostname", AttrType::Text, true)],
            vec![StateDef {
                name: "active".into(),
                initial: true,
            }],
            vec![],
        )
        .unwrap();

    let (res_id, _) = kernel_a
        .mutator()
        .create_entity(genus, kernel_a.main_branch(), vec![], None, None)
        .await
        .unwrap();
    kernel_a
        .mutator()
        .set_attribute(
            res_id,
            kernel_a.main_branch(),
            "hostname".to_string(),
            AttributeValue::Text("db-1".into()),
            None,
        )
        .await
        .unwrap();
    kernel_a
        .mutator()
        .set_attribute(
            res_id,
            kernel_a.main_branch(),
            "hostname".to_string(),
            AttributeValue::Text("db-2".into()),
            None,
        )
        .await
        .unwrap();

    let res = kernel_a.store().get_res(res_id).unwrap();
    let tessellae = kernel_a.store().scan_tessellae(res_id);

    let dir_forward = tempfile::tempdir().unwrap();
    let forward = Smaragda::open(dir_forward.path()).await.unwrap();
    forward.store().create_res(res.clone()).await.unwrap();
    for tessella in &tessellae {
        forward
            .store()
            .ingest_tessella(
                tessella.res_id,
                tessella.branch_id,
                tessella.data.clone(),
                tessella.created_at,
                tessella.origin,
                "sync:a",
            )
            .await
            .unwrap();
    }

    let dir_reverse = tempfile::tempdir().unwrap();
    let reverse = Smaragda::open(dir_reverse.path()).await.unwrap();
    reverse.store().create_res(res).await.unwrap();
    for tessella in tessellae.iter().rev() {
        reverse
            .store()
            .ingest_tessella(
                tessella.res_id,
                tessella.branch_id,
                tessella.data.clone(),
                tessella.created_at,
                tessella.origin,
                "sync:a",
            )
            .await
            .unwrap();
    }

    let state_forward = forward
        .branches()
        .materialize_chain(forward.store(), res_id, forward.main_branch())
        .unwrap();
    let state_reverse = reverse
        .branches()
        .materialize_chain(reverse.store(), res_id, reverse.main_branch())
        .unwrap();
    assert_eq!(state_forward, state_reverse);
    assert_eq!(
        state_forward.attributes.get("hostname"),
        Some(&AttributeValue::Text("db-2".into()))
    );
}

#[tokio::test]
async fn reingesting_an_already_seen_origin_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Smaragda::open(dir.path()).await.unwrap();
    let res = Res::new(Id::new(), kernel.main_branch());
    kernel.store().create_res(res.clone()).await.unwrap();
    let tessella = kernel
        .store()
        .append_tessella(
            res.id,
            kernel.main_branch(),
            TessellaType::Deprecated,
            "local",
        )
        .await
        .unwrap();

    kernel
        .store()
        .ingest_tessella(
            tessella.res_id,
            tessella.branch_id,
            tessella.data.clone(),
            tessella.created_at,
            tessella.origin,
            "sync:self",
        )
        .await
        .unwrap();

    assert_eq!(kernel.store().scan_tessellae(res.id).len(), 1);
}
