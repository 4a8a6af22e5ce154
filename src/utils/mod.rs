pub mod base64;
pub mod file;
pub mod http;
pub mod ini_reader;
pub mod matcher;
pub mod network;
pub mod node_manip;
pub mod string;
pub mod system;
pub mod tribool;
pub mod url;

use md5::{Digest, Md5};

/// Hex MD5 of a string; used for cache file names.
pub fn md5(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
