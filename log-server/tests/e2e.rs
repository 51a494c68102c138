use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn aesdsocket_serves_writes_and_seeks() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("aesdsocket");

    let (mut server, mut server_stdout) = spawn_server(&binary).await?;
    let addr = read_server_addr(&mut server_stdout).await?;

    // Drain additional server logs in the background so the pipe never fills.
    let log_task = tokio::spawn(async move {
        drain_stdout(server_stdout).await;
    });

    let mut client = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;

    // Capacity 3: the fourth write pushes out the first.
    exchange(&mut client, "one\n", "one\n").await?;
    exchange(&mut client, "two\n", "one\ntwo\n").await?;
    exchange(&mut client, "three\n", "one\ntwo\nthree\n").await?;
    exchange(&mut client, "four\n", "two\nthree\nfour\n").await?;
    exchange(&mut client, "AESDCHAR_IOCSEEKTO:1,2\n", "ree\nfour\n").await?;

    // A second connection sees the same log from its own cursor.
    let mut other = TcpStream::connect(&addr).await?;
    exchange(&mut other, "five\n", "three\nfour\nfive\n").await?;

    drop(client);
    drop(other);

    let _ = server.kill().await;
    let _ = server.wait().await;
    let _ = log_task.await;

    Ok(())
}

async fn spawn_server(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("--listen")
        .arg("127.0.0.1:0")
        .arg("--capacity")
        .arg("3")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn aesdsocket")?;
    let stdout = child
        .stdout
        .take()
        .context("aesdsocket stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_server_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let mut line = String::new();
    let bytes = timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| anyhow!("timed out waiting for listening banner"))??;
    if bytes == 0 {
        return Err(anyhow!("aesdsocket exited before listening"));
    }
    let trimmed = line.trim();
    let addr = trimmed
        .split_whitespace()
        .last()
        .context("unexpected banner format")?;
    if !addr.contains(':') {
        return Err(anyhow!("banner missing socket: {trimmed}"));
    }
    Ok(addr.to_string())
}

async fn exchange(stream: &mut TcpStream, command: &str, expected: &str) -> Result<()> {
    stream
        .write_all(command.as_bytes())
        .await
        .with_context(|| format!("failed to send {command:?}"))?;
    let mut reply = vec![0; expected.len()];
    timeout(READ_TIMEOUT, stream.read_exact(&mut reply))
        .await
        .map_err(|_| anyhow!("timed out waiting for reply to {command:?}"))??;
    assert_eq!(String::from_utf8_lossy(&reply), expected);
    Ok(())
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}
