// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stored document layout shared by the storage backends.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StorageResult;
use crate::codec::Codec;
use crate::model::{Binding, Instance};

#[derive(Serialize)]
struct SealedRef<'a, T> {
    #[serde(flatten)]
    record: &'a T,
    sealed_secure_details: String,
}

#[derive(Deserialize)]
struct Sealed<T> {
    #[serde(flatten)]
    record: T,
    #[serde(default)]
    sealed_secure_details: Option<String>,
}

fn seal(codec: &dyn Codec, secure_details: &Value) -> StorageResult<String> {
    let plaintext = serde_json::to_vec(secure_details)?;
    Ok(STANDARD.encode(codec.encrypt(&plaintext)?))
}

fn open(codec: &dyn Codec, sealed: Option<&str>) -> StorageResult<Value> {
    match sealed {
        Some(sealed) if !sealed.is_empty() => {
            let plaintext = codec.decrypt(&STANDARD.decode(sealed)?)?;
            Ok(serde_json::from_slice(&plaintext)?)
        }
        _ => Ok(Value::Null),
    }
}

pub(super) fn encode_instance(codec: &dyn Codec, instance: &Instance) -> StorageResult<String> {
    Ok(serde_json::to_string(&SealedRef {
        record: instance,
        sealed_secure_details: seal(codec, &instance.secure_details)?,
    })?)
}

pub(super) fn decode_instance(codec: &dyn Codec, raw: &str) -> StorageResult<Instance> {
    let sealed: Sealed<Instance> = serde_json::from_str(raw)?;
    let mut instance = sealed.record;
    instance.secure_details = open(codec, sealed.sealed_secure_details.as_deref())?;
    Ok(instance)
}

pub(super) fn encode_binding(codec: &dyn Codec, binding: &Binding) -> StorageResult<String> {
    Ok(serde_json::to_string(&SealedRef {
        record: binding,
        sealed_secure_details: seal(codec, &binding.secure_details)?,
    })?)
}

pub(super) fn decode_binding(codec: &dyn Codec, raw: &str) -> StorageResult<Binding> {
    let sealed: Sealed<Binding> = serde_json::from_str(raw)?;
    let mut binding = sealed.record;
    binding.secure_details = open(codec, sealed.sealed_secure_details.as_deref())?;
    Ok(binding)
}
