//! Client against a live server backed by a SQLite file

use std::net::SocketAddr;

use litegate_client::{ClientError, ErrorKind, GateClient, Map, Row, Value};
use litegate_core::protocol::{decode_response, encode_credential};
use litegate_core::{keys, PermissionStore, Response, Server, ServerConfig, SharedStore};
use litegate_sqlite::SqliteStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

struct TestServer {
    addr: SocketAddr,
    store: SharedStore<SqliteStore>,
    _dir: tempfile::TempDir,
    _stop: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("server.db")).unwrap();
        let store = SharedStore::new(store);
        store
            .with_blocking(|s| {
                s.ensure_schema()?;
                s.protect()
            })
            .unwrap();

        let config = ServerConfig::new().bind_addr("127.0.0.1:0");
        let server = Server::bind(config, store.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(server.run_until(async {
            let _ = stopped.await;
        }));

        Self {
            addr,
            store,
            _dir: dir,
            _stop: stop,
        }
    }

    fn url(&self) -> String {
        self.addr.to_string()
    }

    fn keygen(&self) -> keys::Credential {
        self.store.with_blocking(|s| keys::provision(s)).unwrap()
    }

    fn credential_count(&self) -> u64 {
        self.store.with_blocking(|s| s.credential_count()).unwrap()
    }
}

fn is_integrity_error(err: &ClientError, expected: &str) -> bool {
    matches!(
        err,
        ClientError::Remote { kind: ErrorKind::IntegrityError, message } if message == expected
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bootstrap_admits_any_credential() {
    let server = TestServer::start().await;

    let mut client = GateClient::connect(server.url(), Some("anything")).await.unwrap();
    let rows = client.query("SELECT 1 AS x").await.unwrap();
    assert_eq!(rows, vec![Row::new().with("x", 1)]);

    let mut anonymous = GateClient::connect(server.url(), None).await.unwrap();
    assert_eq!(anonymous.query("SELECT 2 AS y").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_credential_gate() {
    let server = TestServer::start().await;
    let credential = server.keygen();

    let err = GateClient::connect(server.url(), Some("0000"))
        .await
        .err()
        .unwrap();
    assert!(is_integrity_error(&err, "Authentication Failed."), "{err}");

    let err = GateClient::connect(server.url(), None).await.err().unwrap();
    assert!(is_integrity_error(&err, "Authentication Failed."), "{err}");

    let mut client = GateClient::connect(server.url(), Some(credential.as_str()))
        .await
        .unwrap();
    assert_eq!(
        client.query("SELECT 1 AS x").await.unwrap(),
        vec![Row::new().with("x", 1)]
    );
    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rejected_credential_closes_connection() {
    let server = TestServer::start().await;
    server.keygen();

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(&encode_credential(b"wrong")).await.unwrap();
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await.unwrap();
    assert_eq!(
        decode_response(&line).unwrap(),
        Response::authentication_failed()
    );

    line.clear();
    assert_eq!(reader.read_until(b'\n', &mut line).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_credential_table_is_protected() {
    let server = TestServer::start().await;
    let credential = server.keygen();
    let mut client = GateClient::connect(server.url(), Some(credential.as_str()))
        .await
        .unwrap();

    let err = client.query("DELETE FROM REMOTE_ACCESS_KEYS").await.unwrap_err();
    assert!(is_integrity_error(&err, "trying to delete acccess keys(s)!"), "{err}");

    let err = client
        .execute(
            "INSERT INTO REMOTE_ACCESS_KEYS (key) VALUES (?)",
            vec![Value::from("forged")],
            Map::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some("IntegrityError"));

    for statement in [
        "DROP TRIGGER delete_keys",
        "drop   trigger\nIF EXISTS main.insert_keys",
        "DROP TABLE REMOTE_ACCESS_KEYS",
    ] {
        let err = client.query(statement).await.unwrap_err();
        assert!(
            is_integrity_error(&err, "Statement would alter protection of REMOTE_ACCESS_KEYS."),
            "{statement}: {err}"
        );
    }

    // The session survives every rejection
    let rows = client
        .query("SELECT COUNT(*) AS n FROM REMOTE_ACCESS_KEYS")
        .await
        .unwrap();
    assert_eq!(rows, vec![Row::new().with("n", 1)]);
    assert!(server.store.with_blocking(|s| s.is_protected()).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_errors_keep_session_usable() {
    let server = TestServer::start().await;
    let mut client = GateClient::connect(server.url(), None).await.unwrap();

    let err = client.query("SELEC 1").await.unwrap_err();
    assert_eq!(err.remote_kind(), Some("SyntaxError"));

    let err = client.query("SELECT * FROM nowhere").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Remote {
            kind: ErrorKind::OperationalError,
            ..
        }
    ));

    let err = client
        .execute("SELECT ?", vec![], Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some("ProgrammingError"));

    assert_eq!(client.query("SELECT 3 AS z").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_garbage_frame_is_bad_request() {
    let server = TestServer::start().await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    writer.write_all(&encode_credential(b"")).await.unwrap();
    reader.read_until(b'\n', &mut line).await.unwrap();
    assert_eq!(decode_response(&line).unwrap(), Response::Accepted);

    writer.write_all(b"this is not a frame\n").await.unwrap();
    line.clear();
    reader.read_until(b'\n', &mut line).await.unwrap();
    assert_eq!(decode_response(&line).unwrap(), Response::bad_request());

    let request = litegate_core::Request::new("SELECT 1 AS x");
    writer
        .write_all(&litegate_core::protocol::encode_request(&request).unwrap())
        .await
        .unwrap();
    line.clear();
    reader.read_until(b'\n', &mut line).await.unwrap();
    assert_eq!(
        decode_response(&line).unwrap(),
        Response::Rows(vec![Row::new().with("x", 1)])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_never_lose_writes() {
    let server = TestServer::start().await;
    let mut setup = GateClient::connect(server.url(), None).await.unwrap();
    setup
        .query("CREATE TABLE hits (session INTEGER, n INTEGER)")
        .await
        .unwrap();

    const SESSIONS: i64 = 8;
    const INSERTS: i64 = 25;

    let mut handles = Vec::new();
    for session in 0..SESSIONS {
        let url = server.url();
        handles.push(tokio::spawn(async move {
            let mut client = GateClient::connect(url, None).await.unwrap();
            for n in 0..INSERTS {
                client
                    .execute(
                        "INSERT INTO hits VALUES (:session, :n)",
                        vec![],
                        Map::new().with("session", session).with("n", n),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let rows = setup.query("SELECT COUNT(*) AS total FROM hits").await.unwrap();
    assert_eq!(rows, vec![Row::new().with("total", SESSIONS * INSERTS)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_keygens_both_authenticate() {
    let server = TestServer::start().await;
    let before = server.credential_count();

    let first = server.keygen();
    let second = server.keygen();
    assert_ne!(first, second);
    assert_eq!(server.credential_count(), before + 2);

    for credential in [&first, &second] {
        let mut client = GateClient::connect(server.url(), Some(credential.as_str()))
            .await
            .unwrap();
        assert_eq!(client.query("SELECT 1 AS x").await.unwrap().len(), 1);
    }

    let digest = first.digest();
    let revoked = server
        .store
        .with_blocking(move |s| keys::revoke(s, &digest))
        .unwrap();
    assert!(revoked);

    let err = GateClient::connect(server.url(), Some(first.as_str()))
        .await
        .err()
        .unwrap();
    assert!(is_integrity_error(&err, "Authentication Failed."), "{err}");
    assert!(GateClient::connect(server.url(), Some(second.as_str()))
        .await
        .is_ok());
}
