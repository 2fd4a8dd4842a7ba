// SPDX-License-Identifier: MIT

//! External-system adapters for the SCA orchestration server: the Input
//! Fetcher (C2, §4.3) and the Webhook Dispatcher (C8, §4.6).
//!
//! Every externally-facing capability is a trait with a real
//! implementation for production use, plus a `Fake*`/`NoOp*`
//! implementation (behind `test-support`) for deterministic testing of
//! the engine and CLI without hitting the network or a subprocess.

pub mod credentials;
pub mod docker;
pub mod git;
pub mod http_fetch;
pub mod input_fetch;
pub mod purl;
pub mod subprocess;
pub mod tag;
pub mod webhook;

pub use credentials::{select_auth, select_skopeo_auth, AppliedAuth};
pub use docker::{ImagePuller, RegistryCredential, SkopeoImagePuller};
pub use git::{GitCloner, SystemGitCloner};
pub use input_fetch::{record_uploaded, DispatchingInputFetcher, InputFetcher};
pub use purl::{canonical_download_url, parse_purl, HttpLatestVersionResolver, LatestVersionResolver, ParsedPurl};
pub use webhook::{HttpWebhookSender, WebhookPayload, WebhookSender};

#[cfg(any(test, feature = "test-support"))]
pub use docker::FakeImagePuller;
#[cfg(any(test, feature = "test-support"))]
pub use git::FakeGitCloner;
#[cfg(any(test, feature = "test-support"))]
pub use input_fetch::FakeInputFetcher;
#[cfg(any(test, feature = "test-support"))]
pub use webhook::NoOpWebhookSender;
