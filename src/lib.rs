#![doc(html_root_url = "https://docs.rs/live-component/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod checksum;
pub mod client;
pub mod config;
pub mod dirty;
pub mod document;
pub mod error;
pub mod markup;
pub mod protocol;
pub mod server;

mod rc_hash_map;
mod temp_set;

#[cfg(target_arch = "wasm32")]
pub mod web;
