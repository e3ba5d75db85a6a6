//! Secret 명령어
//!
//! SecretManager를 통해 시크릿을 저장/조회합니다.
//! - 값은 `get`에서만 stdout으로 출력
//! - `list`/`has`는 값을 절대 출력하지 않음

use std::io::{BufRead, Write};
use std::path::Path;

use chrono::{TimeZone, Utc};
use serde::Serialize;
use zeroize::Zeroizing;

use super::Outcome;
use crate::error::{KeyManagerError, Result};
use crate::secrets::{Lookup, SecretManager, Source};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExistsResult<'a> {
    name: &'a str,
    exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetResult<'a> {
    name: &'a str,
    value: &'a str,
    source: Source,
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| KeyManagerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    writeln!(out, "{}", text)?;
    Ok(())
}

fn format_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

/// 값 인자가 없으면 입력 첫 줄을 사용 (셸 히스토리에 남지 않도록)
pub fn read_value<R: BufRead>(input: &mut R) -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    input.read_line(&mut line)?;
    let value = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    if value.is_empty() {
        return Err(KeyManagerError::InvalidValue(
            "no value provided on stdin".to_string(),
        ));
    }
    Ok(value)
}

pub fn secrets_save<W: Write>(
    manager: &SecretManager,
    out: &mut W,
    name: &str,
    value: &str,
    env_var: Option<&str>,
    json: bool,
) -> Result<Outcome> {
    manager.save(name, value, env_var)?;
    if json {
        write_json(out, &ExistsResult { name, exists: true })?;
    } else {
        writeln!(out, "saved {}", name)?;
    }
    Ok(Outcome::Success)
}

pub fn secrets_get<W: Write, E: Write>(
    manager: &SecretManager,
    out: &mut W,
    err: &mut E,
    lookup: Lookup<'_>,
    show_source: bool,
    json: bool,
) -> Result<Outcome> {
    let resolved = match manager.resolve(lookup) {
        Ok(resolved) => resolved,
        Err(e) if e.is_not_found() => {
            writeln!(err, "{}", e)?;
            return Ok(Outcome::Negative);
        }
        Err(e) => return Err(e),
    };
    if json {
        // JSON에는 출처가 항상 포함
        let result = GetResult {
            name: lookup.name,
            value: &resolved.value,
            source: resolved.source,
        };
        write_json(out, &result)?;
        return Ok(Outcome::Success);
    }
    writeln!(out, "{}", resolved.value)?;
    if show_source {
        writeln!(err, "source: {}", resolved.source)?;
    }
    Ok(Outcome::Success)
}

pub fn secrets_has<W: Write>(
    manager: &SecretManager,
    out: &mut W,
    name: &str,
    json: bool,
) -> Result<Outcome> {
    let exists = manager.has(name)?;
    if json {
        write_json(out, &ExistsResult { name, exists })?;
    } else {
        writeln!(out, "{}", exists)?;
    }
    Ok(if exists { Outcome::Success } else { Outcome::Negative })
}

pub fn secrets_delete<W: Write>(
    manager: &SecretManager,
    out: &mut W,
    name: &str,
    json: bool,
) -> Result<Outcome> {
    let existed = manager.delete(name)?;
    if json {
        write_json(
            out,
            &ExistsResult {
                name,
                exists: existed,
            },
        )?;
    } else if existed {
        writeln!(out, "deleted {}", name)?;
    } else {
        writeln!(out, "{} did not exist", name)?;
    }
    Ok(if existed { Outcome::Success } else { Outcome::Negative })
}

pub fn secrets_list<W: Write>(
    manager: &SecretManager,
    out: &mut W,
    long: bool,
    json: bool,
) -> Result<Outcome> {
    if long {
        let records = manager.records()?;
        if json {
            write_json(out, &records)?;
            return Ok(Outcome::Success);
        }
        for record in records {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                record.name,
                record.env_var.as_deref().unwrap_or("-"),
                format_millis(record.created_at),
                format_millis(record.updated_at)
            )?;
        }
    } else {
        let names = manager.list()?;
        if json {
            write_json(out, &names)?;
            return Ok(Outcome::Success);
        }
        for name in names {
            writeln!(out, "{}", name)?;
        }
    }
    Ok(Outcome::Success)
}

pub fn secrets_import<W: Write>(
    manager: &SecretManager,
    out: &mut W,
    file: &Path,
    json: bool,
) -> Result<Outcome> {
    let report = manager.import_env_file(file)?;
    if json {
        write_json(out, &report)?;
    } else {
        for name in &report.imported {
            writeln!(out, "imported {}", name)?;
        }
        for line in &report.skipped_lines {
            writeln!(out, "skipped line {}", line)?;
        }
    }
    Ok(Outcome::Success)
}
