//! Prompt text for each stage.

use crate::stage::Stage;

pub const SUCCESS_NOTE: &str = "Great. That worked. Let's move on to the next step.\n\n";

pub fn failure_note(had_code: bool, diagnostic: &str) -> String {
    let lead = if had_code {
        "That code didn't work."
    } else {
        "That answer didn't contain usable code."
    };
    format!(
        "{}\n\nIt got an error:\n\n```\n{}\n```\n\nWrite a version that fixes that error.\n\n",
        lead,
        diagnostic.trim_end()
    )
}

pub fn reference(text: &str) -> String {
    format!(
        "Here is some documentation that might be useful:\n\n{}\n\n",
        text.trim_end()
    )
}

/// Go's name for the host architecture.
pub fn target_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

pub fn interface_definition(slug: &str, intent: &str) -> String {
    format!(
        r#"Write me a protobufs file for a gRPC service that {intent}

Start the file with lines like:

syntax = "proto3";
option go_package = "./protobufs";

The file will be called {slug}.proto. Do not rename any of my files.

My directory layout is:

$ ls .
Dockerfile  client  docker-compose.yaml  go.mod  protobufs  server

My go.mod is:

module {slug}

go 1.19

Users will ask for arguments and variations beyond the obvious call. Think like a product manager for developer experience: what are people likely to want from a service that {intent}? Include those."#,
        slug = slug,
        intent = intent.trim()
    )
}

pub fn server_implementation(message_defs: &[String], service_defs: &[String]) -> String {
    let mut text = format!(
        r#"Now write a server implementation for the service method(s).

Instructions:

1. This is a production implementation. Implement everything; leave nothing out.
2. Use external libraries, packages and binaries where they help.
3. It runs in a Debian (Bookworm) Linux container on the {arch} architecture.
4. The gRPC service listens on port 8000 with insecure connection settings. In the same file, run an HTTP server on port 8001 that accepts the JSON equivalent of each gRPC call and invokes the matching gRPC method.
5. Log every HTTP request with logrus.WithField: method name, relevant arguments and duration.
6. Start the gRPC Serve() in a goroutine, then block on the HTTP server.

Think step by step. Put any commentary in code comments. Double check your imports."#,
        arch = target_arch()
    );
    if !message_defs.is_empty() {
        text.push_str("\n\nSome of the generated protobuf code looks like this:\n\n");
        text.push_str(&message_defs.join("\n\n"));
    }
    if !service_defs.is_empty() {
        text.push_str("\n\nAnd the generated gRPC code:\n\n");
        text.push_str(&service_defs.join("\n\n"));
    }
    text
}

pub fn container_build() -> String {
    r#"Now write a multi-stage Dockerfile that builds and runs your server.

Here is an example:

FROM debian:bookworm-slim AS builder
RUN apt-get update && apt-get install -y --no-install-recommends \
  ca-certificates \
  git \
  golang-go \
  <other_pkgs>
COPY . /app
WORKDIR /app
RUN go get ./...
RUN go build -o /tmp/svc ./server

FROM debian:bookworm-slim
RUN apt-get update && apt-get install -y --no-install-recommends \
  <package_1> \
  <package_2>
COPY --from=builder /tmp/svc /bin/svc
EXPOSE 8000
EXPOSE 8001
CMD ["/bin/svc"]

Install every external library, package and binary the server needs, and keep the line:

RUN go get ./...

Write only the Dockerfile."#
        .to_string()
}

pub fn usage_example(slug: &str, server_source: Option<&str>) -> String {
    let mut text = format!(
        r#"Now write a shell script with an example client call, using curl, to the HTTP service. It is reachable on localhost at the host port printed by:

docker inspect -f '{{{{ (index .NetworkSettings.Ports "8001/tcp" 0).HostPort }}}}' {slug}"#,
        slug = slug
    );
    if let Some(source) = server_source {
        text.push_str("\n\nRemember, the server code is:\n\n```go\n");
        text.push_str(source.trim_end());
        text.push_str("\n```");
    }
    text
}

/// Header placed before artifacts restored from an earlier run.
pub fn resumed(slug: &str, intent: &str, stage: Stage) -> String {
    format!(
        "We are building a gRPC service called {} that {}\n\nWork on it was interrupted. The files finished so far follow. Continue with the {} step.",
        slug,
        intent.trim(),
        stage.as_str().replace('_', " ")
    )
}
