// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-on-stdout output, matching the auxiliary scripts this tool
//! replaces: one pretty-printed JSON object per invocation, exit code 0 on
//! success and 1 on error.

use serde::Serialize;

pub fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("error: failed to serialize output: {e}"),
    }
}

pub fn print_error(message: &str) {
    print_json(&serde_json::json!({ "error": message }));
}
