//! Integration tests for the stdio transport.
//!
//! These tests spawn a real `fsrelay-agent --stdio` process using the
//! binary built by cargo, hand it a driver configuration pointing at a
//! temporary directory and exchange NDJSON JSON-RPC messages with it.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

const TIMEOUT: Duration = Duration::from_secs(10);

struct Agent {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl Agent {
    fn spawn(config: &std::path::Path) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_fsrelay-agent"))
            .arg("--config")
            .arg(config)
            .arg("--stdio")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn fsrelay-agent");
        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();
        Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            next_id: 1,
        }
    }

    /// Send a request and wait for the response with the same id.
    async fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id});
        self.stdin
            .write_all(format!("{request}\n").as_bytes())
            .await
            .unwrap();
        self.stdin.flush().await.unwrap();

        loop {
            let line = tokio::time::timeout(TIMEOUT, self.lines.next_line())
                .await
                .expect("timed out waiting for response")
                .unwrap()
                .expect("agent closed stdout");
            let message: Value = serde_json::from_str(&line).unwrap();
            if message["id"] == id {
                return message;
            }
        }
    }

    async fn command(&mut self, cmd: &str, args: Value) -> Value {
        self.call(
            "driver.command",
            json!({"driver": "work", "cmd": cmd, "args": args}),
        )
        .await
    }

    async fn finish(mut self) {
        drop(self.stdin);
        let status = tokio::time::timeout(TIMEOUT, self.child.wait())
            .await
            .expect("agent did not exit after EOF")
            .unwrap();
        assert!(status.success());
    }
}

fn write_config(dir: &TempDir, permissions: &str) -> std::path::PathBuf {
    let root = dir.path().join("root");
    std::fs::create_dir_all(&root).unwrap();
    let config = dir.path().join("config.json");
    let contents = json!({
        "name": "integration",
        "drivers": [{"name": "work", "path": root, "permissions": permissions}]
    });
    std::fs::write(&config, contents.to_string()).unwrap();
    config
}

async fn initialized_agent(config: &std::path::Path) -> Agent {
    let mut agent = Agent::spawn(config);
    let response = agent
        .call(
            "initialize",
            json!({"protocol_version": "0.1.0", "client": "it", "client_version": "0"}),
        )
        .await;
    assert_eq!(response["result"]["drivers"], json!(["work"]));
    agent
}

#[tokio::test]
async fn file_session_over_stdio() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "readWrite");
    let mut agent = initialized_agent(&config).await;
    let file = json!({"_t": "file", "path": "a.txt", "id": 1});

    assert!(agent.command("createFile", json!([file])).await["result"].is_null());
    agent
        .command("write", json!([file, "hello", null, null, 0]))
        .await;
    agent.command("close", json!([file])).await;

    assert_eq!(agent.command("fileLength", json!([file])).await["result"], 5);
    assert_eq!(agent.command("readAll", json!([file])).await["result"], "hello");
    assert_eq!(agent.call("health.check", Value::Null).await["result"]["open_files"], 0);

    agent.finish().await;
    assert_eq!(
        std::fs::read_to_string(dir.path().join("root/a.txt")).unwrap(),
        "hello"
    );
}

#[tokio::test]
async fn archive_round_trip_over_stdio() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "readWrite");
    std::fs::create_dir_all(dir.path().join("root/site/img")).unwrap();
    std::fs::write(dir.path().join("root/site/index.html"), "<p>hi</p>").unwrap();
    std::fs::write(dir.path().join("root/site/img/logo.bin"), [9u8; 300]).unwrap();
    let mut agent = initialized_agent(&config).await;

    let site = json!({"_t": "directory", "path": "site"});
    let zip = json!({"_t": "file", "path": "site.zip"});
    let out = json!({"_t": "directory", "path": "restored"});

    let response = agent.command("zipDirectory", json!([site, zip])).await;
    assert!(response.get("error").is_none(), "{response}");
    let response = agent.command("unzip", json!([zip, out])).await;
    assert!(response.get("error").is_none(), "{response}");

    let listing = agent.command("readDirectory", json!([out, 1])).await;
    assert_eq!(
        listing["result"],
        json!([
            {"path": "restored/img", "type": "directory"},
            {"path": "restored/img/logo.bin", "type": "file"},
            {"path": "restored/index.html", "type": "file"}
        ])
    );
    agent.finish().await;

    assert_eq!(
        std::fs::read(dir.path().join("root/restored/img/logo.bin")).unwrap(),
        vec![9u8; 300]
    );
}

#[tokio::test]
async fn read_only_driver_refuses_mutations_over_stdio() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "read");
    let mut agent = initialized_agent(&config).await;

    let response = agent
        .command("mkDir", json!([{"_t": "directory", "path": "new"}]))
        .await;
    assert_eq!(response["error"]["code"], -32011);
    let response = agent.command("format", json!([])).await;
    assert_eq!(response["error"]["code"], -32601);

    agent.finish().await;
    assert!(!dir.path().join("root/new").exists());
}
