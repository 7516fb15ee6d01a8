use futures::FutureExt;
use std::{future::Future, panic::AssertUnwindSafe};

pub mod auth;
pub mod cashback;
pub mod catalog;
mod concurrency;
pub mod database;
mod hex;
pub mod ledger;
pub mod login;
pub mod money;
pub mod otp;
pub mod phone;
pub mod user;
mod worker;

#[derive(Debug, Clone, Copy)]
pub struct QueryRange {
    pub limit: i64,
    pub offset: i64,
}

async fn swallow_panic(f: impl Future<Output = ()>) {
    let _ = AssertUnwindSafe(f).catch_unwind().await;
}
