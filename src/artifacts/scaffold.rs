//! Starter files written into a fresh task directory.

use std::path::PathBuf;

/// A file created when a task directory is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Subdirectories every task tree starts with.
pub const SCAFFOLD_DIRS: [&str; 3] = ["protobufs", "server", "client"];

/// Shared docker network the generated services join.
pub const SERVICE_NETWORK: &str = "seedlings";

const PLACEHOLDER_MAIN: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"placeholder\")\n}\n";

pub fn scaffold_files(slug: &str) -> Vec<ScaffoldFile> {
    vec![
        file("go.mod", format!("module {}\n\ngo 1.19\n", slug)),
        file(
            &format!("protobufs/{}.proto", slug),
            "syntax = \"proto3\";\n\noption go_package = \".\";\n".to_string(),
        ),
        file("server/main.go", PLACEHOLDER_MAIN.to_string()),
        file("client/main.go", PLACEHOLDER_MAIN.to_string()),
        file(
            "Dockerfile",
            "FROM debian:bookworm-slim\nCOPY . /app\n".to_string(),
        ),
        file("docker-compose.yaml", compose_file(slug)),
        file(".gitignore", "logs\n".to_string()),
    ]
}

fn compose_file(slug: &str) -> String {
    format!(
        r#"version: "3.9"
services:
  {slug}:
    image: {slug}
    networks:
      - {network}
    volumes:
      - ../secrets:/secrets

networks:
  {network}:
    external: true
"#,
        slug = slug,
        network = SERVICE_NETWORK
    )
}

fn file(path: &str, contents: String) -> ScaffoldFile {
    ScaffoldFile {
        path: PathBuf::from(path),
        contents,
    }
}
