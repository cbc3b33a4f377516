//! A minimal in-process server speaking just enough of the CQL binary
//! protocol (versions 4 and 5, uncompressed) to exercise the driver:
//! handshake, queries, preparation, execution, and paging.
//!
//! The framing here is written from scratch on purpose, so that the tests
//! check the driver's bytes against an independent interpretation of the
//! wire format.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TYPE_INT: u16 = 0x0009;
pub const TYPE_VARCHAR: u16 = 0x000D;

const ERROR_UNPREPARED: i32 = 0x2500;

/// What the mock answers to one request.
pub enum MockResponse {
    Void,
    Rows {
        columns: Vec<(&'static str, u16)>,
        rows: Vec<Vec<Option<Vec<u8>>>>,
        paging_state: Option<Vec<u8>>,
        no_metadata: bool,
        new_metadata_id: Option<Vec<u8>>,
    },
    Prepared {
        id: Vec<u8>,
        result_metadata_id: Option<Vec<u8>>,
        variables: Vec<(&'static str, u16)>,
        pk_indexes: Vec<u16>,
        result_columns: Vec<(&'static str, u16)>,
    },
    Unprepared {
        id: Vec<u8>,
    },
    ServerError {
        code: i32,
        message: String,
    },
}

/// Scripted server behavior; the default answers are deliberately dull.
pub trait MockBehavior: Send + Sync + 'static {
    fn on_query(
        &self,
        _cql: &str,
        _page_size: Option<i32>,
        _paging_state: Option<Vec<u8>>,
    ) -> MockResponse {
        MockResponse::Void
    }

    fn on_prepare(&self, _cql: &str) -> MockResponse {
        MockResponse::ServerError {
            code: 0x2200,
            message: "nothing to prepare here".to_string(),
        }
    }

    fn on_execute(
        &self,
        _id: &[u8],
        _page_size: Option<i32>,
        _paging_state: Option<Vec<u8>>,
    ) -> MockResponse {
        MockResponse::ServerError {
            code: 0x2200,
            message: "nothing prepared here".to_string(),
        }
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
}

impl MockServer {
    /// Binds on a loopback port and serves connections until dropped.
    pub async fn spawn(behavior: Arc<dyn MockBehavior>) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else {
                    return;
                };
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, behavior).await;
                });
            }
        });
        MockServer { addr }
    }

    pub fn contact_point(&self) -> cqlconnect::ConnectParams {
        cqlconnect::ConnectParams::builder()
            .hostname(self.addr.ip().to_string())
            .port(self.addr.port())
            .build()
            .unwrap()
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    behavior: Arc<dyn MockBehavior>,
) -> std::io::Result<()> {
    loop {
        let mut header = [0_u8; 9];
        stream.read_exact(&mut header).await?;
        let version = header[0] & 0x7F;
        assert!(
            version == 4 || version == 5,
            "mock only speaks protocol 4 and 5, client sent {version}"
        );
        assert_eq!(header[0] & 0x80, 0, "client must send request frames");
        let stream_id = i16::from_be_bytes([header[2], header[3]]);
        let opcode = header[4];
        let body_length = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);
        let mut body = vec![0; body_length as usize];
        stream.read_exact(&mut body).await?;

        let mut cur = Cursor::new(&body);
        let response = match opcode {
            0x05 => (0x06, supported_body()), // OPTIONS
            0x01 => (0x02, Vec::new()),       // STARTUP
            0x0B => (0x02, Vec::new()),       // REGISTER
            0x07 => {
                // QUERY
                let cql = cur.long_string();
                let (page_size, paging_state) = parse_query_parameters(&mut cur, version == 5);
                encode_response(behavior.on_query(&cql, page_size, paging_state), version)
            }
            0x09 => {
                // PREPARE
                let cql = cur.long_string();
                if version == 5 {
                    let flags = cur.i32();
                    if flags & 0x01 != 0 {
                        let _keyspace = cur.string();
                    }
                }
                assert!(cur.at_end(), "unparsed bytes in a PREPARE body");
                encode_response(behavior.on_prepare(&cql), version)
            }
            0x0A => {
                // EXECUTE
                let id = cur.short_bytes();
                if version == 5 {
                    let result_metadata_id = cur.short_bytes();
                    assert!(
                        !result_metadata_id.is_empty(),
                        "EXECUTE on protocol 5 must carry a result metadata id"
                    );
                }
                let (page_size, paging_state) = parse_query_parameters(&mut cur, version == 5);
                encode_response(behavior.on_execute(&id, page_size, paging_state), version)
            }
            opcode => panic!("mock server got an unexpected opcode 0x{opcode:02X}"),
        };

        let (opcode, response_body) = response;
        let mut frame = Vec::with_capacity(9 + response_body.len());
        frame.push(0x80 | version);
        frame.push(0);
        frame.extend_from_slice(&stream_id.to_be_bytes());
        frame.push(opcode);
        frame.extend_from_slice(&u32::try_from(response_body.len()).unwrap().to_be_bytes());
        frame.extend_from_slice(&response_body);
        stream.write_all(&frame).await?;
        stream.flush().await?;
    }
}

fn parse_query_parameters(cur: &mut Cursor, v5: bool) -> (Option<i32>, Option<Vec<u8>>) {
    let _consistency = cur.u16();
    let flags = if v5 {
        cur.i32()
    } else {
        i32::from(cur.u8())
    };
    if flags & 0x01 != 0 {
        let n = cur.u16();
        for _ in 0..n {
            if flags & 0x40 != 0 {
                let _name = cur.string();
            }
            let _value = cur.bytes();
        }
    }
    let page_size = (flags & 0x04 != 0).then(|| cur.i32());
    let paging_state = if flags & 0x08 != 0 { cur.bytes() } else { None };
    if flags & 0x10 != 0 {
        let _serial = cur.u16();
    }
    if flags & 0x20 != 0 {
        let _timestamp = cur.i64();
    }
    if v5 && flags & 0x80 != 0 {
        let _keyspace = cur.string();
    }
    if v5 && flags & 0x100 != 0 {
        let _now = cur.i32();
    }
    assert!(cur.at_end(), "unparsed bytes in query parameters");
    (page_size, paging_state)
}

fn supported_body() -> Vec<u8> {
    let mut body = Vec::new();
    put_u16(&mut body, 2);
    put_string(&mut body, "CQL_VERSION");
    put_u16(&mut body, 1);
    put_string(&mut body, "3.0.0");
    put_string(&mut body, "COMPRESSION");
    put_u16(&mut body, 1);
    put_string(&mut body, "lz4");
    body
}

fn encode_response(response: MockResponse, version: u8) -> (u8, Vec<u8>) {
    match response {
        MockResponse::Void => {
            let mut body = Vec::new();
            put_i32(&mut body, 0x0001);
            (0x08, body)
        }
        MockResponse::Rows {
            columns,
            rows,
            paging_state,
            no_metadata,
            new_metadata_id,
        } => {
            let mut body = Vec::new();
            put_i32(&mut body, 0x0002);
            let mut flags = 0x0001; // global tables spec
            if paging_state.is_some() {
                flags |= 0x0002;
            }
            if no_metadata {
                flags = 0x0004 | (flags & 0x0002);
            }
            if new_metadata_id.is_some() {
                assert_eq!(version, 5);
                flags |= 0x0008;
            }
            put_i32(&mut body, flags);
            put_i32(&mut body, i32::try_from(columns.len()).unwrap());
            if let Some(id) = new_metadata_id {
                put_short_bytes(&mut body, &id);
            }
            if let Some(state) = &paging_state {
                put_bytes(&mut body, Some(state));
            }
            if !no_metadata {
                put_string(&mut body, "ks");
                put_string(&mut body, "tbl");
                for (name, type_code) in &columns {
                    put_string(&mut body, name);
                    put_u16(&mut body, *type_code);
                }
            }
            put_i32(&mut body, i32::try_from(rows.len()).unwrap());
            for row in rows {
                for cell in row {
                    put_bytes(&mut body, cell.as_deref());
                }
            }
            (0x08, body)
        }
        MockResponse::Prepared {
            id,
            result_metadata_id,
            variables,
            pk_indexes,
            result_columns,
        } => {
            let mut body = Vec::new();
            put_i32(&mut body, 0x0004);
            put_short_bytes(&mut body, &id);
            if version == 5 {
                put_short_bytes(
                    &mut body,
                    result_metadata_id.as_deref().unwrap_or(b"default-rmid"),
                );
            }
            // variables metadata
            put_i32(&mut body, 0x0001);
            put_i32(&mut body, i32::try_from(variables.len()).unwrap());
            put_i32(&mut body, i32::try_from(pk_indexes.len()).unwrap());
            for pk_index in &pk_indexes {
                put_u16(&mut body, *pk_index);
            }
            put_string(&mut body, "ks");
            put_string(&mut body, "tbl");
            for (name, type_code) in &variables {
                put_string(&mut body, name);
                put_u16(&mut body, *type_code);
            }
            // result metadata
            put_i32(&mut body, 0x0001);
            put_i32(&mut body, i32::try_from(result_columns.len()).unwrap());
            put_string(&mut body, "ks");
            put_string(&mut body, "tbl");
            for (name, type_code) in &result_columns {
                put_string(&mut body, name);
                put_u16(&mut body, *type_code);
            }
            (0x08, body)
        }
        MockResponse::Unprepared { id } => {
            let mut body = Vec::new();
            put_i32(&mut body, ERROR_UNPREPARED);
            put_string(&mut body, "unknown prepared statement");
            put_short_bytes(&mut body, &id);
            (0x00, body)
        }
        MockResponse::ServerError { code, message } => {
            let mut body = Vec::new();
            put_i32(&mut body, code);
            put_string(&mut body, &message);
            (0x00, body)
        }
    }
}

// --- primitive writers ---

pub fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_string(out: &mut Vec<u8>, s: &str) {
    put_u16(out, u16::try_from(s.len()).unwrap());
    out.extend_from_slice(s.as_bytes());
}

pub fn put_short_bytes(out: &mut Vec<u8>, b: &[u8]) {
    put_u16(out, u16::try_from(b.len()).unwrap());
    out.extend_from_slice(b);
}

pub fn put_bytes(out: &mut Vec<u8>, b: Option<&[u8]>) {
    match b {
        Some(b) => {
            put_i32(out, i32::try_from(b.len()).unwrap());
            out.extend_from_slice(b);
        }
        None => put_i32(out, -1),
    }
}

/// Cell content of an int column.
pub fn int_cell(v: i32) -> Option<Vec<u8>> {
    Some(v.to_be_bytes().to_vec())
}

/// Cell content of a text column.
pub fn text_cell(s: &str) -> Option<Vec<u8>> {
    Some(s.as_bytes().to_vec())
}

// --- primitive reader over a response body ---

pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    pub fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_be_bytes(self.take(2).try_into().unwrap())
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_be_bytes(self.take(4).try_into().unwrap())
    }

    pub fn i64(&mut self) -> i64 {
        i64::from_be_bytes(self.take(8).try_into().unwrap())
    }

    pub fn string(&mut self) -> String {
        let len = self.u16() as usize;
        String::from_utf8(self.take(len).to_vec()).unwrap()
    }

    pub fn long_string(&mut self) -> String {
        let len = usize::try_from(self.i32()).unwrap();
        String::from_utf8(self.take(len).to_vec()).unwrap()
    }

    pub fn short_bytes(&mut self) -> Vec<u8> {
        let len = self.u16() as usize;
        self.take(len).to_vec()
    }

    pub fn bytes(&mut self) -> Option<Vec<u8>> {
        let len = self.i32();
        if len < 0 {
            None
        } else {
            Some(self.take(usize::try_from(len).unwrap()).to_vec())
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}
