//! Lightweight scanning of generated Go sources for prompt context.
//!
//! This is not a Go parser. It recognises the top-level declaration shapes
//! `protoc-gen-go` and `protoc-gen-go-grpc` emit, which is all the prompts
//! need.

use std::sync::LazyLock;

use regex::Regex;

static TYPE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^type\s+\w+\s+(?:struct|interface)\s*\{").expect("literal pattern compiles")
});

static IMPORT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:[\w.]+\s+)?"([^"]+)""#).expect("literal pattern compiles")
});

/// Every top-level `type X struct {..}` / `type X interface {..}` block in
/// `source`, verbatim.
pub fn type_definitions(source: &str) -> Vec<String> {
    let mut defs = Vec::new();
    for header in TYPE_HEADER.find_iter(source) {
        // The match ends just past the opening brace.
        let open = header.end() - 1;
        if let Some(close) = matching_brace(source, open) {
            defs.push(source[header.start()..=close].to_string());
        }
    }
    defs
}

/// Byte index of the `}` closing the `{` at `open`. Braces inside comments,
/// string literals and struct tags are skipped.
fn matching_brace(source: &str, open: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Import paths in `source` that do not belong to the standard library
/// (their first path element contains a dot). Relative imports are skipped.
pub fn non_std_imports(source: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut in_block = false;

    for line in source.lines() {
        let trimmed = line.trim();
        if in_block {
            if trimmed.starts_with(')') {
                in_block = false;
                continue;
            }
            if let Some(path) = import_path(trimmed) {
                paths.push(path);
            }
        } else if let Some(rest) = trimmed.strip_prefix("import") {
            let rest = rest.trim_start();
            if rest.starts_with('(') {
                in_block = true;
            } else if let Some(path) = import_path(rest) {
                paths.push(path);
            }
        }
    }

    paths
        .into_iter()
        .filter(|p| !p.starts_with('.') && p.split('/').next().is_some_and(|h| h.contains('.')))
        .collect()
}

fn import_path(spec: &str) -> Option<String> {
    IMPORT_PATH.captures(spec).map(|c| c[1].to_string())
}

/// Import paths whose documentation is too large to be useful in a prompt.
pub const NOISY_IMPORT_MARKERS: [&str; 4] = ["protobuf", "logrus", "grpc", "spew"];

pub fn is_noisy_import(path: &str) -> bool {
    NOISY_IMPORT_MARKERS.iter().any(|m| path.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PB_GO: &str = r#"package protobufs

import (
	protoreflect "google.golang.org/protobuf/reflect/protoreflect"
	reflect "reflect"
)

type EchoRequest struct {
	state         protoimpl.MessageState
	Message string `protobuf:"bytes,1,opt,name=message,proto3" json:"message,omitempty"`
}

func (x *EchoRequest) GetMessage() string {
	if x != nil {
		return x.Message
	}
	return ""
}

// EchoServer is the server API for Echo service.
type EchoServer interface {
	// Echo returns the message { unchanged }
	Echo(context.Context, *EchoRequest) (*EchoReply, error)
	mustEmbedUnimplementedEchoServer()
}

type unexported int
"#;

    #[test]
    fn test_type_definitions_finds_structs_and_interfaces() {
        let defs = type_definitions(PB_GO);
        assert_eq!(defs.len(), 2);
        assert!(defs[0].starts_with("type EchoRequest struct {"));
        assert!(defs[0].ends_with('}'));
        assert!(defs[0].contains("json:\"message,omitempty\""));
        assert!(defs[1].starts_with("type EchoServer interface {"));
        assert!(defs[1].contains("mustEmbedUnimplementedEchoServer()"));
        assert!(!defs[1].contains("GetMessage"));
    }

    #[test]
    fn test_type_definitions_empty_source() {
        assert!(type_definitions("package main\n").is_empty());
    }

    #[test]
    fn test_non_std_imports_block_and_single() {
        let source = r#"package main

import "github.com/sirupsen/logrus"

import (
	"context"
	"net/http"
	pb "echo/protobufs"
	"github.com/go-redis/redis/v8"
	_ "github.com/lib/pq"
	"./local"
)
"#;
        assert_eq!(
            non_std_imports(source),
            vec![
                "github.com/sirupsen/logrus".to_string(),
                "github.com/go-redis/redis/v8".to_string(),
                "github.com/lib/pq".to_string(),
            ]
        );
    }

    #[test]
    fn test_noisy_imports() {
        assert!(is_noisy_import("google.golang.org/grpc"));
        assert!(is_noisy_import("github.com/sirupsen/logrus"));
        assert!(!is_noisy_import("github.com/go-redis/redis/v8"));
    }
}
