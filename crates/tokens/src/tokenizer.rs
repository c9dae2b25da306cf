use crate::config::TokenizerConfig;
use crate::error::TokenError;
use crate::frame::strip_token;

/// Splits the source text of one code block into normalized tokens.
///
/// Steps, in order: comments are removed, separators become whitespace, noise
/// sequences are deleted, the text is split on whitespace and every token is
/// stripped of quotes, backslashes and colons. Empty tokens are dropped.
pub fn tokenize_block(text: &str, cfg: &TokenizerConfig) -> Result<Vec<String>, TokenError> {
    cfg.validate()?;

    let mut text = remove_comments(text, cfg);
    for separator in &cfg.separators {
        if text.contains(separator.as_str()) {
            text = text.replace(separator.as_str(), " ");
        }
    }
    for noise in &cfg.noise {
        if text.contains(noise.as_str()) {
            text = text.replace(noise.as_str(), "");
        }
    }

    Ok(text
        .split_whitespace()
        .map(strip_token)
        .filter(|token| !token.is_empty())
        .map(|token| token.into_owned())
        .collect())
}

fn remove_comments(text: &str, cfg: &TokenizerConfig) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let line = cfg
            .line_comment
            .as_deref()
            .and_then(|marker| rest.find(marker).map(|at| (at, marker.len())));
        let block = cfg
            .block_comment
            .as_ref()
            .and_then(|(open, _)| rest.find(open.as_str()).map(|at| (at, open.len())));

        match (line, block) {
            (Some((at, len)), Some((b_at, _))) if at < b_at => {
                out.push_str(&rest[..at]);
                out.push(' ');
                rest = skip_line(&rest[at + len..]);
            }
            (Some((at, len)), None) => {
                out.push_str(&rest[..at]);
                out.push(' ');
                rest = skip_line(&rest[at + len..]);
            }
            (_, Some((at, len))) => {
                out.push_str(&rest[..at]);
                out.push(' ');
                let close = cfg
                    .block_comment
                    .as_ref()
                    .map(|(_, close)| close.as_str())
                    .unwrap_or_default();
                let body = &rest[at + len..];
                // An unterminated block comment swallows the remainder.
                rest = match body.find(close) {
                    Some(end) => &body[end + close.len()..],
                    None => "",
                };
            }
            (None, None) => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn skip_line(text: &str) -> &str {
    match text.find(['\n', '\r']) {
        Some(end) => &text[end..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        tokenize_block(text, &TokenizerConfig::default()).unwrap()
    }

    #[test]
    fn splits_on_operators_and_punctuation() {
        assert_eq!(
            tokens("int x = a.b(c, d[0]) + 1;"),
            vec!["int", "x", "a", "b", "c", "d", "0", "1"]
        );
    }

    #[test]
    fn removes_line_and_block_comments() {
        let src = "foo(); // trailing note\n/* block\n spanning */ bar();";
        assert_eq!(tokens(src), vec!["foo", "bar"]);
    }

    #[test]
    fn unterminated_block_comment_drops_rest() {
        assert_eq!(tokens("keep /* never closed"), vec!["keep"]);
    }

    #[test]
    fn strips_quotes_and_drops_empty_tokens() {
        assert_eq!(
            tokens(r#"print("hello") ; '' label:"#),
            vec!["print", "hello", "label"]
        );
    }

    #[test]
    fn removes_token_file_delimiters() {
        assert_eq!(tokens("a@@::@@b @#@ c"), vec!["ab", "c"]);
    }

    #[test]
    fn custom_comment_markers() {
        let cfg = TokenizerConfig {
            line_comment: Some("#".into()),
            block_comment: None,
            ..Default::default()
        };
        let out = tokenize_block("x = 1 # set x\ny = 2", &cfg).unwrap();
        assert_eq!(out, vec!["x", "1", "y", "2"]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = TokenizerConfig {
            version: 0,
            ..Default::default()
        };
        assert!(matches!(
            tokenize_block("x", &cfg),
            Err(TokenError::InvalidConfig(_))
        ));
    }
}
