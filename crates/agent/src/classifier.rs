//! Message classifier — tells game text apart from everything else on the
//! relay.
//!
//! A line counts as coming from a source when it has the shape
//! `[:]<source><non-space>* PRIVMSG <own_nick> :<payload>`. The payload is
//! returned as a borrowed slice with surrounding whitespace and one trailing
//! period removed; anything else, malformed envelopes included, classifies as
//! not-from-source with an empty payload.

/// The result of classifying one raw line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified<'a> {
    pub from_source: bool,
    pub payload: &'a str,
}

impl Classified<'static> {
    /// Not from any source.
    pub const NONE: Classified<'static> = Classified {
        from_source: false,
        payload: "",
    };
}

/// Classify `raw` against a single source nick.
pub fn classify<'a>(raw: &'a str, source: &str, own_nick: &str) -> Classified<'a> {
    match strip_envelope(raw, source, own_nick) {
        Some(payload) => Classified {
            from_source: true,
            payload,
        },
        None => Classified::NONE,
    }
}

/// Classify `raw` against several sources; returns the index of the source
/// that matched together with the payload.
pub fn classify_any<'a>(raw: &'a str, sources: &[&str], own_nick: &str) -> Option<(usize, &'a str)> {
    sources
        .iter()
        .enumerate()
        .find_map(|(i, source)| strip_envelope(raw, source, own_nick).map(|p| (i, p)))
}

fn strip_envelope<'a>(raw: &'a str, source: &str, own_nick: &str) -> Option<&'a str> {
    if source.is_empty() {
        return None;
    }
    let rest = raw.strip_prefix(':').unwrap_or(raw);
    let rest = rest.strip_prefix(source)?;

    // `nick!user@host`: the prefix runs up to the first space
    let space = rest.find(' ')?;
    let rest = rest[space..].strip_prefix(" PRIVMSG ")?;
    let rest = rest.strip_prefix(own_nick)?;
    let payload = rest.strip_prefix(" :")?.trim();

    Some(payload.strip_suffix('.').unwrap_or(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAMB: &str = "Lamb3";
    const ME: &str = "shadowbot";

    #[test]
    fn strips_envelope_and_period() {
        let raw = ":Lamb3!~lamb@shadowlamb.org PRIVMSG shadowbot :You arrive at Redmond.";
        assert_eq!(
            classify(raw, LAMB, ME),
            Classified {
                from_source: true,
                payload: "You arrive at Redmond"
            }
        );
    }

    #[test]
    fn leading_colon_is_optional() {
        let raw = "Lamb3!x@y PRIVMSG shadowbot :You are inside Redmond_Hotel.";
        assert_eq!(classify(raw, LAMB, ME).payload, "You are inside Redmond_Hotel");
    }

    #[test]
    fn only_one_period_is_trimmed() {
        let raw = ":Lamb3!x@y PRIVMSG shadowbot :Hmm...";
        assert_eq!(classify(raw, LAMB, ME).payload, "Hmm..");
    }

    #[test]
    fn non_matching_lines_are_empty() {
        let lines = [
            "",
            "PING :irc.libera.chat",
            ":NickServ!x@y NOTICE shadowbot :Last login from: x",
            ":Other!x@y PRIVMSG shadowbot :You arrive at Redmond.",
            ":Lamb3!x@y PRIVMSG someoneelse :You arrive at Redmond.",
            ":Lamb3!x@y NOTICE shadowbot :You arrive at Redmond.",
            ":Lamb3!x@y PRIVMSG shadowbot",
            ":Lamb3",
            "garbage without structure",
        ];
        for line in lines {
            assert_eq!(classify(line, LAMB, ME), Classified::NONE, "line: {line:?}");
        }
    }

    #[test]
    fn classifies_is_idempotent() {
        let raw = ":Lamb3!x@y PRIVMSG shadowbot :You continue.";
        assert_eq!(classify(raw, LAMB, ME), classify(raw, LAMB, ME));
    }

    #[test]
    fn any_reports_which_source() {
        let raw = ":friend!x@y PRIVMSG shadowbot :goto Redmond_Hotel";
        assert_eq!(
            classify_any(raw, &[LAMB, "friend"], ME),
            Some((1, "goto Redmond_Hotel"))
        );
        assert_eq!(classify_any(raw, &[LAMB], ME), None);
    }
}
