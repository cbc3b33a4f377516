mod mock_server;
mod test_utils;

use cqlconnect::{
    CqlValue, ProtocolVersion, Session, SessionConfiguration, Statement, StatementOptions,
};
use mock_server::{
    int_cell, text_cell, MockBehavior, MockResponse, MockServer, TYPE_INT, TYPE_VARCHAR,
};
use std::sync::Arc;

const CQL: &str = "SELECT * FROM ks.tbl";

// Mimics an ALTER TABLE between two pages of one result set: the first
// page has two columns, the second page announces a changed metadata id
// and carries a third column.
struct AlteredMidway;

impl MockBehavior for AlteredMidway {
    fn on_prepare(&self, cql: &str) -> MockResponse {
        assert_eq!(cql, CQL);
        MockResponse::Prepared {
            id: b"pid".to_vec(),
            result_metadata_id: Some(b"metadata-1".to_vec()),
            variables: vec![],
            pk_indexes: vec![],
            result_columns: vec![("k", TYPE_INT), ("v", TYPE_VARCHAR)],
        }
    }

    fn on_execute(
        &self,
        id: &[u8],
        _page_size: Option<i32>,
        paging_state: Option<Vec<u8>>,
    ) -> MockResponse {
        assert_eq!(id, b"pid");
        match paging_state {
            None => MockResponse::Rows {
                columns: vec![("k", TYPE_INT), ("v", TYPE_VARCHAR)],
                rows: vec![vec![int_cell(1), text_cell("one")]],
                paging_state: Some(b"page-2".to_vec()),
                no_metadata: true,
                new_metadata_id: None,
            },
            Some(state) => {
                assert_eq!(state, b"page-2");
                MockResponse::Rows {
                    columns: vec![
                        ("k", TYPE_INT),
                        ("v", TYPE_VARCHAR),
                        ("c", TYPE_VARCHAR),
                    ],
                    rows: vec![vec![int_cell(2), text_cell("two"), text_cell("extra")]],
                    paging_state: None,
                    no_metadata: false,
                    new_metadata_id: Some(b"metadata-2".to_vec()),
                }
            }
        }
    }
}

#[tokio::test]
async fn result_metadata_rotates_across_pages() {
    let _logger = test_utils::init_logger();
    let server = MockServer::spawn(Arc::new(AlteredMidway)).await;
    let mut config = SessionConfiguration::default();
    config.protocol.set_max_version(ProtocolVersion::V5);
    let session = Session::connect(vec![server.contact_point()], config)
        .await
        .unwrap();

    let prepared = session.prepare(CQL).await.unwrap();
    assert_eq!(
        prepared.result_metadata_id(),
        Some(b"metadata-1".to_vec())
    );
    assert_eq!(prepared.result_metadata().column_count(), 2);

    let statement: Statement = prepared
        .bind(vec![])
        .unwrap()
        .with_options(StatementOptions::default().with_page_size(1))
        .into();
    let mut result_set = session.query(statement).await.unwrap();

    // page one still carries the old shape
    let row = result_set.next_row().await.unwrap().unwrap();
    assert_eq!(row.len(), 2);
    assert_eq!(row.value(0).unwrap(), CqlValue::Int(1));
    assert_eq!(row.metadata().column_count(), 2);

    // the page after the schema change carries the added column, and the
    // cached metadata has rotated along
    let row = result_set.next_row().await.unwrap().unwrap();
    assert_eq!(row.len(), 3);
    assert_eq!(row.value(2).unwrap(), CqlValue::Text("extra".to_string()));
    assert_eq!(row.metadata().column_count(), 3);
    assert!(result_set.next_row().await.unwrap().is_none());

    assert_eq!(
        prepared.result_metadata_id(),
        Some(b"metadata-2".to_vec())
    );
    assert_eq!(prepared.result_metadata().column_count(), 3);
}
