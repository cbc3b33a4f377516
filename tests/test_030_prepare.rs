mod mock_server;
mod test_utils;

use cqlconnect::{CqlError, CqlValue, Session, SessionConfiguration};
use mock_server::{
    int_cell, text_cell, MockBehavior, MockResponse, MockServer, TYPE_INT, TYPE_VARCHAR,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CQL: &str = "SELECT k, v FROM ks.tbl WHERE k = ?";

fn prepared_response(id: &[u8]) -> MockResponse {
    MockResponse::Prepared {
        id: id.to_vec(),
        result_metadata_id: None,
        variables: vec![("k", TYPE_INT)],
        pk_indexes: vec![0],
        result_columns: vec![("k", TYPE_INT), ("v", TYPE_VARCHAR)],
    }
}

struct Plain {
    prepare_calls: AtomicUsize,
}

impl MockBehavior for Plain {
    fn on_prepare(&self, cql: &str) -> MockResponse {
        assert_eq!(cql, CQL);
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        prepared_response(b"pid-1")
    }

    fn on_execute(
        &self,
        id: &[u8],
        _page_size: Option<i32>,
        _paging_state: Option<Vec<u8>>,
    ) -> MockResponse {
        assert_eq!(id, b"pid-1");
        MockResponse::Rows {
            // the driver asked to skip the metadata it already has cached
            columns: vec![("k", TYPE_INT), ("v", TYPE_VARCHAR)],
            rows: vec![vec![int_cell(7), text_cell("seven")]],
            paging_state: None,
            no_metadata: true,
            new_metadata_id: None,
        }
    }
}

#[tokio::test]
async fn prepare_execute_and_cache() {
    let _logger = test_utils::init_logger();
    let behavior = Arc::new(Plain {
        prepare_calls: AtomicUsize::new(0),
    });
    let server = MockServer::spawn(behavior.clone()).await;
    let session = Session::connect(
        vec![server.contact_point()],
        SessionConfiguration::default(),
    )
    .await
    .unwrap();

    let prepared = session.prepare(CQL).await.unwrap();
    assert_eq!(prepared.query_id(), b"pid-1");
    assert_eq!(prepared.partition_key_indexes(), [0]);
    assert_eq!(prepared.variables().column_count(), 1);
    assert!(!prepared.is_lwt());

    // the partition key is a single int column: the routing key is its
    // serialized value
    let bound = prepared.bind(vec![CqlValue::Int(7)]).unwrap();
    assert_eq!(
        bound.routing_key(cqlconnect::ProtocolVersion::V4).unwrap(),
        7_i32.to_be_bytes().to_vec()
    );

    // rows decode with the cached result metadata (the server omitted its
    // copy)
    let row = session
        .execute(&prepared, vec![CqlValue::Int(7)])
        .await
        .unwrap()
        .single_row()
        .await
        .unwrap();
    assert_eq!(row.value(0).unwrap(), CqlValue::Int(7));
    assert_eq!(row.value(1).unwrap(), CqlValue::Text("seven".to_string()));

    // a second prepare of the same text hits the cache
    let again = session.prepare(CQL).await.unwrap();
    assert!(Arc::ptr_eq(&prepared, &again));
    assert_eq!(behavior.prepare_calls.load(Ordering::SeqCst), 1);

    // binding must match the variables metadata
    assert!(prepared.bind(vec![]).is_err());
    assert!(prepared
        .bind(vec![CqlValue::Int(1), CqlValue::Int(2)])
        .is_err());
}

struct ForgetsOnce {
    prepare_calls: AtomicUsize,
    execute_calls: AtomicUsize,
}

impl MockBehavior for ForgetsOnce {
    fn on_prepare(&self, _cql: &str) -> MockResponse {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        prepared_response(b"pid-2")
    }

    fn on_execute(
        &self,
        id: &[u8],
        _page_size: Option<i32>,
        _paging_state: Option<Vec<u8>>,
    ) -> MockResponse {
        assert_eq!(id, b"pid-2");
        if self.execute_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            // restarted since the statement was prepared
            MockResponse::Unprepared {
                id: id.to_vec(),
            }
        } else {
            MockResponse::Rows {
                columns: vec![("k", TYPE_INT), ("v", TYPE_VARCHAR)],
                rows: vec![vec![int_cell(1), text_cell("one")]],
                paging_state: None,
                no_metadata: true,
                new_metadata_id: None,
            }
        }
    }
}

#[tokio::test]
async fn unprepared_triggers_a_transparent_reprepare() {
    let behavior = Arc::new(ForgetsOnce {
        prepare_calls: AtomicUsize::new(0),
        execute_calls: AtomicUsize::new(0),
    });
    let server = MockServer::spawn(behavior.clone()).await;
    let session = Session::connect(
        vec![server.contact_point()],
        SessionConfiguration::default(),
    )
    .await
    .unwrap();

    let prepared = session.prepare(CQL).await.unwrap();
    let row = session
        .execute(&prepared, vec![CqlValue::Int(1)])
        .await
        .unwrap()
        .single_row()
        .await
        .unwrap();
    assert_eq!(row.value(1).unwrap(), CqlValue::Text("one".to_string()));

    // initial prepare + the transparent reprepare
    assert_eq!(behavior.prepare_calls.load(Ordering::SeqCst), 2);
    assert_eq!(behavior.execute_calls.load(Ordering::SeqCst), 2);
}

struct ForgetsAndRenames {
    prepare_calls: AtomicUsize,
}

impl MockBehavior for ForgetsAndRenames {
    fn on_prepare(&self, _cql: &str) -> MockResponse {
        if self.prepare_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            prepared_response(b"pid-old")
        } else {
            prepared_response(b"pid-new")
        }
    }

    fn on_execute(
        &self,
        id: &[u8],
        _page_size: Option<i32>,
        _paging_state: Option<Vec<u8>>,
    ) -> MockResponse {
        MockResponse::Unprepared { id: id.to_vec() }
    }
}

#[tokio::test]
async fn reprepare_with_a_different_id_fails_fast() {
    let behavior = Arc::new(ForgetsAndRenames {
        prepare_calls: AtomicUsize::new(0),
    });
    let server = MockServer::spawn(behavior).await;
    let session = Session::connect(
        vec![server.contact_point()],
        SessionConfiguration::default(),
    )
    .await
    .unwrap();

    let prepared = session.prepare(CQL).await.unwrap();
    let error = session
        .execute(&prepared, vec![CqlValue::Int(1)])
        .await
        .unwrap_err();
    match error {
        CqlError::PreparedStatementIdMismatch {
            expected_id,
            received_id,
        } => {
            assert_eq!(expected_id, b"pid-old");
            assert_eq!(received_id, b"pid-new");
        }
        other => panic!("expected the id mismatch, got {other:?}"),
    }
}
