use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::Path;
use tar::Builder;

const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

/// ビルドコンテキスト (tar.gz) を作る
pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドコンテキストをtar.gzアーカイブとして作成
    ///
    /// `.dockerignore` の除外パターンと `.git` はアーカイブに含めない。
    /// Dockerfile はコンテキスト外にあっても "Dockerfile" として追加する。
    pub fn create_context(context_path: &Path, dockerfile_path: &Path) -> BuildResult<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        let ignore = IgnorePatterns::load(context_path)?;

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            append_dir(&mut tar, context_path, Path::new(""), &ignore)?;

            let dockerfile_content = fs::read(dockerfile_path)
                .map_err(|_| BuildError::DockerfileNotFound(dockerfile_path.to_path_buf()))?;

            let mut header = tar::Header::new_gnu();
            header.set_path("Dockerfile").map_err(|e| {
                BuildError::InvalidConfig(format!("Failed to set Dockerfile path: {}", e))
            })?;
            header.set_size(dockerfile_content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();

            tar.append(&header, &dockerfile_content[..])?;

            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());

        if archive_data.len() > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "ビルドコンテキストが大きすぎます（{}MB）。.dockerignore で不要なファイルを除外してください。",
                archive_data.len() / 1024 / 1024
            );
        }

        Ok(archive_data)
    }
}

fn append_dir<W: std::io::Write>(
    tar: &mut Builder<W>,
    root: &Path,
    relative: &Path,
    ignore: &IgnorePatterns,
) -> BuildResult<()> {
    let mut entries = fs::read_dir(root.join(relative))?.collect::<Result<Vec<_>, _>>()?;
    // アーカイブ内の順序を安定させる
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let rel_path = relative.join(entry.file_name());
        let ignored = ignore.is_ignored(&rel_path);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            // 除外されたディレクトリでも `!` で戻すファイルがあり得る
            if ignored && !ignore.has_exceptions() {
                continue;
            }
            if !ignored {
                tar.append_dir(&rel_path, entry.path())?;
            }
            append_dir(tar, root, &rel_path, ignore)?;
        } else if file_type.is_file() && !ignored {
            tar.append_path_with_name(entry.path(), &rel_path)?;
        }
    }

    Ok(())
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug)]
struct IgnoreRule {
    pattern: Pattern,
    /// `!` で始まる再包含ルール
    exception: bool,
}

impl IgnoreRule {
    fn parse(line: &str) -> BuildResult<Self> {
        let (exception, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let body = body
            .trim_start_matches("./")
            .trim_start_matches('/')
            .trim_end_matches('/');

        let pattern = Pattern::new(body).map_err(|e| {
            BuildError::InvalidConfig(format!(".dockerignore のパターンが不正です: {} ({})", line, e))
        })?;
        Ok(Self { pattern, exception })
    }

    /// パス自身か、その親ディレクトリのどれかに一致するか
    fn matches(&self, path: &str) -> bool {
        path.match_indices('/')
            .map(|(i, _)| &path[..i])
            .chain(std::iter::once(path))
            .any(|candidate| self.pattern.matches_with(candidate, MATCH_OPTIONS))
    }
}

/// .dockerignore の除外ルール
///
/// パスはコンテキストからの相対パスで評価し、後に書かれたルールが優先される。
#[derive(Debug)]
struct IgnorePatterns {
    rules: Vec<IgnoreRule>,
}

impl IgnorePatterns {
    fn load(context_path: &Path) -> BuildResult<Self> {
        let mut rules = vec![IgnoreRule::parse(".git")?];

        let path = context_path.join(".dockerignore");
        if path.is_file() {
            let content = fs::read_to_string(&path)?;
            for line in content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
            {
                rules.push(IgnoreRule::parse(line)?);
            }
        }

        Ok(Self { rules })
    }

    fn has_exceptions(&self) -> bool {
        self.rules.iter().any(|r| r.exception)
    }

    fn is_ignored(&self, rel_path: &Path) -> bool {
        let path = rel_path.to_string_lossy().replace('\\', "/");

        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(&path))
            .is_some_and(|rule| !rule.exception)
    }
}
