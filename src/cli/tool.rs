//-
// Copyright (c) 2024, Tooltracker contributors
//
// This file is part of Tooltracker.
//
// Tooltracker is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Tooltracker is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Tooltracker. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::io;

use log::info;

use super::main::ToolSubcommand;
use crate::store::{tags::is_valid_tag_name, Connection, Tool};
use crate::support::{
    log_prefix::LogPrefix, sysexits::*, system_config::SystemConfig,
};

pub(super) fn tool(config: SystemConfig, cmd: ToolSubcommand) {
    let log_prefix = LogPrefix::new("tool".to_owned());
    let mut store = match Connection::open(&config.store.path, &log_prefix) {
        Ok(store) => store,
        Err(e) => die!(
            EX_UNAVAILABLE,
            "Failed to open '{}': {}",
            config.store.path.display(),
            e
        ),
    };

    if cmd.show {
        match store.get_tool(&cmd.name) {
            Ok(Some(tool)) => print!("{}", describe(&tool)),
            Ok(None) => die!(EX_NOINPUT, "No such tool: {}", cmd.name),
            Err(e) => die!(EX_SOFTWARE, "Failed to look up tool: {}", e),
        }
        return;
    }

    let tool = match build_tool(cmd) {
        Ok(tool) => tool,
        Err((exit, message)) => die!(exit, "{}", message),
    };

    if let Err(e) = store.update_tool(&tool) {
        die!(EX_SOFTWARE, "Failed to update {}: {}", tool.name, e);
    }
    info!("{log_prefix} Updated {}", tool.name);
}

fn build_tool(cmd: ToolSubcommand) -> Result<Tool, (Sysexit, String)> {
    let name = cmd.name.trim().to_owned();
    if name.is_empty() {
        return Err((EX_USAGE, "The tool name must not be empty".to_owned()));
    }

    if let Some(bad) = cmd.tag.iter().find(|t| !is_valid_tag_name(t)) {
        return Err((
            EX_USAGE,
            format!(
                "Bad tag {:?}: tags are a letter followed by letters, \
                 digits, and underscores",
                bad,
            ),
        ));
    }

    let image = match cmd.image {
        None => None,
        Some(ref path) => match fs::read(path) {
            Ok(data) => Some(data),
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                return Err((
                    EX_NOINPUT,
                    format!("{}: not found", path.display()),
                ));
            },
            Err(e) => {
                return Err((
                    EX_IOERR,
                    format!("Failed to read {}: {}", path.display(), e),
                ));
            },
        },
    };

    Ok(Tool {
        name,
        description: cmd.description,
        image,
        tags: cmd.tag,
    })
}

fn describe(tool: &Tool) -> String {
    let mut out = format!("Name:        {}\n", tool.name);
    if let Some(ref description) = tool.description {
        out.push_str(&format!("Description: {description}\n"));
    }
    if let Some(ref image) = tool.image {
        out.push_str(&format!("Image:       {} bytes\n", image.len()));
    }
    if !tool.tags.is_empty() {
        out.push_str(&format!("Tags:        {}\n", tool.tags.join(" ")));
    }
    out
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    fn tool_cmd(
        name: &str,
        image: Option<PathBuf>,
        tags: &[&str],
    ) -> ToolSubcommand {
        ToolSubcommand {
            show: false,
            description: Some("Blue".to_owned()),
            image,
            tag: tags.iter().map(|&t| t.to_owned()).collect(),
            name: name.to_owned(),
        }
    }

    #[test]
    fn build_and_store() {
        let tmpdir = TempDir::new().unwrap();
        let image_path = tmpdir.path().join("drill.png");
        fs::write(&image_path, b"\x89PNG").unwrap();

        let tool =
            build_tool(tool_cmd(" Drill ", Some(image_path), &["power"]))
                .unwrap();
        assert_eq!("Drill", tool.name);
        assert_eq!(Some(b"\x89PNG".to_vec()), tool.image);

        let mut store = Connection::open_in_memory().unwrap();
        store.update_tool(&tool).unwrap();
        let stored = store.get_tool("Drill").unwrap().unwrap();
        assert_eq!(
            "Name:        Drill\n\
             Description: Blue\n\
             Image:       4 bytes\n\
             Tags:        power\n",
            describe(&stored),
        );
    }

    #[test]
    fn bad_arguments() {
        assert_matches!(
            Err((EX_USAGE, _)),
            build_tool(tool_cmd(" ", None, &[])),
        );
        assert_matches!(
            Err((EX_USAGE, _)),
            build_tool(tool_cmd("Drill", None, &["-hidden"])),
        );

        let tmpdir = TempDir::new().unwrap();
        assert_matches!(
            Err((EX_NOINPUT, _)),
            build_tool(tool_cmd(
                "Drill",
                Some(tmpdir.path().join("nonexistent.png")),
                &[],
            )),
        );
    }
}
