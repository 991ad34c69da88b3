use crate::error::{RpcError, RpcResult};
use regex::Regex;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

const HEADER_PATTERN: &str = r"^Content-Length:\s*(\d+)\s*$";

/// 受け付けるフレーム本体の最大バイト数
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// LSPスタイルのContent-Lengthヘッダーでフレーミングされたメッセージを読み取る
pub struct FrameReader<R> {
    reader: BufReader<R>,
    header: Regex,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> RpcResult<Self> {
        let header = Regex::new(HEADER_PATTERN)
            .map_err(|e| RpcError::InvalidMessage(format!("Invalid header pattern: {}", e)))?;
        Ok(Self {
            reader: BufReader::new(reader),
            header,
        })
    }

    /// 次のフレームを読み取る。ストリームが終端に達した場合は `None`
    pub async fn read_frame(&mut self) -> RpcResult<Option<String>> {
        let mut content_length = None;
        let mut line = String::new();

        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                if content_length.is_some() {
                    return Err(RpcError::InvalidMessage(
                        "Stream ended inside frame headers".to_string(),
                    ));
                }
                return Ok(None);
            }

            let header = line.trim();
            if header.is_empty() {
                // ヘッダー前の空行は読み飛ばす
                if content_length.is_some() {
                    break;
                }
                continue;
            }

            match self.header.captures(header) {
                Some(captures) => {
                    let length = captures[1].parse::<usize>().map_err(|_| {
                        RpcError::InvalidMessage(format!("Invalid Content-Length: {}", header))
                    })?;
                    if length > MAX_FRAME_SIZE {
                        return Err(RpcError::InvalidMessage(format!(
                            "Frame of {} bytes exceeds the {} byte limit",
                            length, MAX_FRAME_SIZE
                        )));
                    }
                    content_length = Some(length);
                }
                None if content_length.is_some() => {
                    log::debug!("Ignoring header: {}", header);
                }
                None => {
                    return Err(RpcError::InvalidMessage(format!(
                        "Expected Content-Length header, got: {}",
                        header
                    )));
                }
            }
        }

        let length = content_length.unwrap_or_default();
        let mut body = vec![0u8; length];
        self.reader.read_exact(&mut body).await?;

        let text = String::from_utf8(body)
            .map_err(|_| RpcError::InvalidMessage("Frame body is not UTF-8".to_string()))?;
        log::debug!("Received: {}", text);
        Ok(Some(text))
    }
}

/// メッセージをフレーミングして書き込む
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &str) -> RpcResult<()> {
    let frame = format!("Content-Length: {}\r\n\r\n{}", message.len(), message);
    log::debug!("Sending: {}", message);

    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// フレーミングされたバイトストリームをメッセージチャンネルとして扱うリンク
///
/// 送信側は [`MessageSender`](super::MessageSender) として
/// `Dispatcher` に渡し、受信側は `Dispatcher::serve` に渡す。
pub struct FramedLink {
    outbound: mpsc::UnboundedSender<String>,
    inbound: Option<mpsc::UnboundedReceiver<String>>,
    tasks: Vec<JoinHandle<()>>,
    child: Option<Child>,
    shutdown: CancellationToken,
}

impl FramedLink {
    /// 任意の読み書きストリーム上でリンクを開始する
    pub fn spawn<R, W>(reader: R, writer: W) -> RpcResult<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let frames = FrameReader::new(reader)?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let read_handle = tokio::spawn(Self::read_loop(frames, inbound_tx));
        let write_handle = tokio::spawn(Self::write_loop(writer, outbound_rx, shutdown.clone()));

        Ok(Self {
            outbound: outbound_tx,
            inbound: Some(inbound_rx),
            tasks: vec![read_handle, write_handle],
            child: None,
            shutdown,
        })
    }

    /// stdin/stdoutを使ったサーバー側のリンク
    pub fn stdio() -> RpcResult<Self> {
        Self::spawn(tokio::io::stdin(), tokio::io::stdout())
    }

    /// 子プロセスを起動し、そのstdin/stdoutとリンクする
    pub fn spawn_child(command: &str, args: &[&str]) -> RpcResult<Self> {
        log::debug!("Spawning process: {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Child process stdin not available",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Child process stdout not available",
            ))
        })?;
        let stderr = child.stderr.take();

        let mut link = Self::spawn(stdout, stdin)?;
        if let Some(stderr) = stderr {
            link.tasks.push(tokio::spawn(Self::stderr_loop(stderr)));
        }
        link.child = Some(child);
        Ok(link)
    }

    /// 送信用のハンドル
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.outbound.clone()
    }

    /// 受信チャンネルを取り出す（一度だけ）
    pub fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.inbound.take()
    }

    async fn read_loop<R: AsyncRead + Unpin>(
        mut frames: FrameReader<R>,
        inbound: mpsc::UnboundedSender<String>,
    ) {
        loop {
            match frames.read_frame().await {
                Ok(Some(text)) => {
                    if inbound.send(text).is_err() {
                        log::debug!("Receiver dropped, terminating read loop");
                        break;
                    }
                }
                Ok(None) => {
                    log::debug!("EOF reached, terminating read loop");
                    break;
                }
                Err(e) => {
                    log::error!("Frame read error: {}", e);
                    break;
                }
            }
        }
    }

    async fn write_loop<W: AsyncWrite + Unpin>(
        mut writer: W,
        mut outbound: mpsc::UnboundedReceiver<String>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else {
                        log::debug!("Outbound channel closed");
                        break;
                    };
                    if let Err(e) = write_frame(&mut writer, &message).await {
                        log::error!("Failed to send message: {}", e);
                        break;
                    }
                }
                _ = shutdown.cancelled() => {
                    log::debug!("Shutdown signal received");
                    break;
                }
            }
        }
        // writerのdropで相手側にEOFが伝わる
    }

    async fn stderr_loop(stderr: tokio::process::ChildStderr) {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    log::debug!("Child stderr EOF");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        log::warn!("Child stderr: {}", trimmed);
                    }
                }
                Err(e) => {
                    log::debug!("Error reading stderr: {}", e);
                    break;
                }
            }
        }
    }

    /// グレースフルシャットダウン
    ///
    /// 書き込みを止めて相手側にEOFを伝え、子プロセスがあれば終了を待つ。
    pub async fn shutdown(mut self) -> RpcResult<()> {
        log::debug!("Shutting down framed link");
        self.shutdown.cancel();

        if let Some(mut child) = self.child.take() {
            match timeout(Duration::from_secs(5), child.wait()).await {
                Ok(status) => {
                    log::debug!("Process exited with status: {:?}", status);
                }
                Err(_) => {
                    log::warn!("Process didn't exit gracefully, killing");
                    child.kill().await?;
                }
            }
        }

        for handle in &self.tasks {
            handle.abort();
        }
        Ok(())
    }
}

impl Drop for FramedLink {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for handle in &self.tasks {
            handle.abort();
        }
    }
}
