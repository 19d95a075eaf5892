use anyhow::anyhow;
use russh_sftp::client::error::Error;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{Status, StatusCode};
use upsync_core::ConnectError;

const DEFAULT_PORT: u16 = 22;

/// Split `host`, `host:port` or `[v6]:port`. A bare IPv6 address keeps the
/// default port.
pub(crate) fn split_host_port(input: &str) -> Result<(String, u16), ConnectError> {
    let input = input.trim();
    let invalid = || ConnectError::InvalidHost(input.to_string());
    if input.is_empty() {
        return Err(invalid());
    }
    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host.to_string(), port.parse().map_err(|_| invalid())?)),
            None if tail.is_empty() => Ok((host.to_string(), DEFAULT_PORT)),
            None => Err(invalid()),
        };
    }
    match input.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => Ok((input.to_string(), DEFAULT_PORT)),
        Some((host, port)) if !host.is_empty() => Ok((host.to_string(), port.parse().map_err(|_| invalid())?)),
        Some(_) => Err(invalid()),
        None => Ok((input.to_string(), DEFAULT_PORT)),
    }
}

/// Every proper prefix directory of a POSIX path, plus the path itself,
/// shallowest first: `/a/b/c` → `/a`, `/a/b`, `/a/b/c`.
fn dir_prefixes(path: &str) -> Vec<&str> {
    let trimmed = path.trim_end_matches('/');
    let mut out: Vec<&str> = trimmed
        .match_indices('/')
        .map(|(i, _)| &trimmed[..i])
        .filter(|p| !p.is_empty() && !p.ends_with('/'))
        .collect();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
    out
}

fn failure(message: String) -> Error {
    Error::Status(Status {
        id: 0,
        status_code: StatusCode::Failure,
        error_message: message,
        language_tag: "en-US".to_string(),
    })
}

/// Create a remote directory and all of its missing parents.
///
/// Existing directories are never re-created: the deepest existing ancestor
/// is located first and only the directories below it are created. Fails if
/// a component of the path exists as a file.
pub(crate) async fn create_dir_all(sftp: &SftpSession, path: &str) -> Result<(), Error> {
    let prefixes = dir_prefixes(path);
    let mut start = prefixes.len();
    while start > 0 {
        match sftp.metadata(prefixes[start - 1]).await {
            Ok(attrs) if attrs.is_dir() => break,
            Ok(_) => {
                return Err(failure(format!(
                    "path component is a file, not a directory: {}",
                    prefixes[start - 1]
                )))
            }
            Err(_) => start -= 1,
        }
    }

    for dir in &prefixes[start..] {
        if let Err(e) = sftp.create_dir(*dir).await {
            // Failure may mean another client created it in the meantime.
            let is_failure = matches!(&e, Error::Status(status) if status.status_code == StatusCode::Failure);
            if !is_failure {
                return Err(e);
            }
            match sftp.metadata(*dir).await {
                Ok(attrs) if attrs.is_dir() => {}
                Ok(_) => {
                    return Err(failure(format!(
                        "path component is a file, not a directory: {dir}"
                    )))
                }
                Err(_) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Fold the results of releasing several resources into one.
pub(crate) fn close_errors<const N: usize>(results: [(&str, anyhow::Result<()>); N]) -> anyhow::Result<()> {
    let errors: Vec<String> = results
        .into_iter()
        .filter_map(|(what, res)| res.err().map(|e| format!("error closing {what}: {e}")))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_parsing() {
        assert_eq!(split_host_port("example.org").unwrap(), ("example.org".into(), 22));
        assert_eq!(split_host_port("example.org:2222").unwrap(), ("example.org".into(), 2222));
        assert_eq!(split_host_port("[::1]:2200").unwrap(), ("::1".into(), 2200));
        assert_eq!(split_host_port("[::1]").unwrap(), ("::1".into(), 22));
        assert_eq!(split_host_port("fe80::1").unwrap(), ("fe80::1".into(), 22));
        assert!(matches!(split_host_port(""), Err(ConnectError::InvalidHost(_))));
        assert!(matches!(split_host_port("host:ssh"), Err(ConnectError::InvalidHost(_))));
        assert!(matches!(split_host_port(":22"), Err(ConnectError::InvalidHost(_))));
    }

    #[test]
    fn prefixes_of_absolute_and_relative_paths() {
        assert_eq!(dir_prefixes("/srv/www/a"), vec!["/srv", "/srv/www", "/srv/www/a"]);
        assert_eq!(dir_prefixes("backup/a/"), vec!["backup", "backup/a"]);
        assert_eq!(dir_prefixes("/"), Vec::<&str>::new());
        assert_eq!(dir_prefixes("single"), vec!["single"]);
    }

    #[test]
    fn close_errors_are_aggregated() {
        assert!(close_errors([("SFTP session", Ok(())), ("SSH connection", Ok(()))]).is_ok());

        let err = close_errors([
            ("SFTP session", Err(anyhow!("eof"))),
            ("SSH connection", Err(anyhow!("broken pipe"))),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error closing SFTP session: eof; error closing SSH connection: broken pipe"
        );

        let err = close_errors([("SFTP session", Ok(())), ("SSH connection", Err(anyhow!("reset")))])
            .unwrap_err();
        assert_eq!(err.to_string(), "error closing SSH connection: reset");
    }
}
