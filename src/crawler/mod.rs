//! Crawler Module
//!
//! Client for a job-based web crawling service (WebcrawlerAPI wire format):
//! submit a scrape job, poll it to completion, fetch the produced content.
//!
//! Free-text queries are turned into a handful of candidate URLs first, see
//! [`candidates::derive_candidates`].

pub mod candidates;
pub mod client;
mod wire;

pub use candidates::{derive_candidates, MAX_CANDIDATES};
pub use client::CrawlJobClient;
