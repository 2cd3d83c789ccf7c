// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payload decoding for fetched result objects.
//!
//! Stored objects may be plain JSON or gzip-compressed JSON, and object
//! metadata is not trustworthy enough to distinguish the two. Decoding tries
//! plain JSON first and falls back to gunzip-then-parse.

use crate::errors::DecodeError;
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use std::io::Read;

pub(crate) fn decode_json<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T, DecodeError> {
    let plain_cause = match serde_json::from_slice(data) {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };

    let mut decompressed = Vec::new();
    let gzip_cause = match GzDecoder::new(data).read_to_end(&mut decompressed) {
        Ok(_) => match serde_json::from_slice(&decompressed) {
            Ok(value) => return Ok(value),
            Err(error) => error.to_string(),
        },
        Err(error) => error.to_string(),
    };

    Err(DecodeError {
        key: key.to_owned(),
        plain_cause,
        gzip_cause,
    })
}
