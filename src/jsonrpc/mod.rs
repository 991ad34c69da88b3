//! JSON-RPC 2.0 wire layer
//!
//! このモジュールはメッセージ型とトランスポートのみを扱い、
//! ルーティングや相関付けは [`crate::rpc`] に任せる。
//!
//! ## 主要コンポーネント
//!
//! - [`types`]: リクエスト・レスポンス・エラーのメッセージ型
//! - [`transport`]: 送信の抽象化 ([`MessageSender`]) とインメモリのduplex
//! - [`stdio`]: Content-Lengthフレーミングによるstdio／子プロセス通信
//!
//! ## 使用例
//!
//! ```rust,no_run
//! # async fn example() -> rpcbridge::RpcResult<()> {
//! use rpcbridge::jsonrpc::FramedLink;
//!
//! // サーバー側（stdio通信）
//! let server = FramedLink::stdio()?;
//!
//! // クライアント側（子プロセス管理）
//! let client = FramedLink::spawn_child("rpcbridge", &["serve"])?;
//! # Ok(())
//! # }
//! ```

pub mod stdio;
pub mod transport;
pub mod types;

pub use stdio::{write_frame, FrameReader, FramedLink};
pub use transport::{duplex, Endpoint, MessageSender};
pub use types::{ErrorCode, ErrorObject, Message, Request, Response};
