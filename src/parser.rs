//! Column extractor for generated base models.
//!
//! Locates the single explicit `select <columns> from` projection of a model
//! and splits it into columns.
//!
//! ```text
//! renamed as (
//!     select
//!         customerid,                      ── Column { source_name: "customerid" }
//!         coalesce(a, b) as currency       ── Column { source_name: "currency" }
//!     from source                          ── end of the column list
//! )
//! select * from renamed                    ── star projection, left alone
//! ```
//!
//! The lexer understands just enough SQL to find boundaries: whitespace,
//! comments, Jinja regions, string literals, quoted identifiers and
//! parentheses. Commas only separate columns at the list's own nesting depth.

use std::ops::Range;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while1},
    character::complete::{anychar, char, multispace1, not_line_ending},
    combinator::{all_consuming, cut, recognize, value},
    multi::{many0, separated_list1},
    sequence::{pair, preceded, terminated},
};

use crate::ast::{Column, Projection};
use crate::error::{DbtGenError, DbtGenResult};

/// Extract the ordered column list of a model.
pub fn extract(sql: &str) -> DbtGenResult<Vec<Column>> {
    Ok(locate(sql)?.columns)
}

/// Locate the model's explicit column list together with its position in `sql`.
pub fn locate(sql: &str) -> DbtGenResult<Projection> {
    let tokens = tokenize(sql)?;
    let mut found: Option<Projection> = None;
    let mut saw_select = false;

    for (i, tok) in tokens.iter().enumerate() {
        if !is_keyword(sql, tok, "select") {
            continue;
        }
        saw_select = true;
        let Some(projection) = select_list(sql, &tokens, i)? else {
            continue;
        };
        if found.is_some() {
            return Err(DbtGenError::malformed(
                tok.span.start,
                "more than one explicit column list (union or multi-select models are not supported)",
            ));
        }
        found = Some(projection);
    }

    found.ok_or_else(|| {
        if saw_select {
            DbtGenError::malformed(0, "only star projections found, no explicit column list")
        } else {
            DbtGenError::malformed(0, "no select ... from column list found")
        }
    })
}

/// The last part of a plain or dotted column reference, or `None` for any
/// other expression.
///
/// `src.CustomerID` gives `CustomerID`, `src."Customer ID"` gives
/// `"Customer ID"` (quotes kept), `upper(name)` gives `None`.
pub fn trailing_identifier(expression: &str) -> Option<&str> {
    let part = alt((quoted_identifier, take_while1(is_ident_char)));
    let parsed: IResult<&str, Vec<&str>> =
        all_consuming(separated_list1(char('.'), part))(expression.trim());
    let (_, parts) = parsed.ok()?;
    parts
        .last()
        .copied()
        .filter(|p| !p.starts_with(|c: char| c.is_ascii_digit()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Trivia,
    Word,
    Comma,
    Open,
    Close,
    Other,
}

/// A significant lexeme. `depth` is the parenthesis nesting level it sits at;
/// matching `(` and `)` share the depth of their surroundings.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: Lexeme,
    span: Range<usize>,
    depth: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_keyword(sql: &str, tok: &Token, keyword: &str) -> bool {
    tok.kind == Lexeme::Word && sql[tok.span.clone()].eq_ignore_ascii_case(keyword)
}

fn tokenize(sql: &str) -> DbtGenResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut open_parens: Vec<usize> = Vec::new();
    let mut rest = sql;

    while !rest.is_empty() {
        let start = sql.len() - rest.len();
        let (next, kind) = lexeme(rest).map_err(|e| match e {
            nom::Err::Failure(_) => DbtGenError::malformed(start, unterminated(rest)),
            _ => DbtGenError::malformed(start, "unrecognized input"),
        })?;
        let span = start..sql.len() - next.len();
        rest = next;

        match kind {
            Lexeme::Trivia => {}
            Lexeme::Open => {
                tokens.push(Token { kind, span, depth: open_parens.len() });
                open_parens.push(start);
            }
            Lexeme::Close => {
                if open_parens.pop().is_none() {
                    return Err(DbtGenError::malformed(
                        start,
                        "unbalanced parentheses: unexpected ')'",
                    ));
                }
                tokens.push(Token { kind, span, depth: open_parens.len() });
            }
            _ => tokens.push(Token { kind, span, depth: open_parens.len() }),
        }
    }

    if let Some(&pos) = open_parens.last() {
        return Err(DbtGenError::malformed(pos, "unbalanced parentheses: '(' is never closed"));
    }
    Ok(tokens)
}

fn unterminated(rest: &str) -> &'static str {
    if rest.starts_with('\'') {
        "unterminated string literal"
    } else if rest.starts_with("/*") {
        "unterminated block comment"
    } else if rest.starts_with('{') {
        "unterminated template tag"
    } else {
        "unterminated quoted identifier"
    }
}

/// Parse one lexeme.
fn lexeme(input: &str) -> IResult<&str, Lexeme> {
    alt((
        value(Lexeme::Trivia, multispace1),
        value(Lexeme::Trivia, line_comment),
        value(Lexeme::Trivia, block_comment),
        value(Lexeme::Other, template_tag),
        value(Lexeme::Other, string_literal),
        value(Lexeme::Word, quoted_identifier),
        value(Lexeme::Word, take_while1(is_ident_char)),
        value(Lexeme::Comma, char(',')),
        value(Lexeme::Open, char('(')),
        value(Lexeme::Close, char(')')),
        value(Lexeme::Other, anychar),
    ))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("--"), not_line_ending))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(preceded(tag("/*"), cut(pair(take_until("*/"), tag("*/")))))(input)
}

/// Jinja expression, statement or comment: `{{ }}`, `{% %}`, `{# #}`.
fn template_tag(input: &str) -> IResult<&str, &str> {
    recognize(alt((
        preceded(tag("{{"), cut(pair(take_until("}}"), tag("}}")))),
        preceded(tag("{%"), cut(pair(take_until("%}"), tag("%}")))),
        preceded(tag("{#"), cut(pair(take_until("#}"), tag("#}")))),
    )))(input)
}

/// Single-quoted literal with `''` escapes.
fn string_literal(input: &str) -> IResult<&str, &str> {
    recognize(preceded(
        char('\''),
        cut(terminated(many0(alt((is_not("'"), tag("''")))), char('\''))),
    ))(input)
}

fn quoted_identifier(input: &str) -> IResult<&str, &str> {
    recognize(alt((
        preceded(char('"'), cut(pair(take_until("\""), char('"')))),
        preceded(char('`'), cut(pair(take_until("`"), char('`')))),
    )))(input)
}

/// Read the column list opened by the `select` at `tokens[at]`.
///
/// Returns `None` for star projections.
fn select_list(sql: &str, tokens: &[Token], at: usize) -> DbtGenResult<Option<Projection>> {
    let select = &tokens[at];
    let depth = select.depth;
    let mut segments: Vec<Range<usize>> = Vec::new();
    let mut seg_start = at + 1;
    let mut closed = false;

    for (j, tok) in tokens.iter().enumerate().skip(at + 1) {
        if tok.depth < depth {
            break;
        }
        if is_keyword(sql, tok, "select") {
            return Err(DbtGenError::malformed(
                tok.span.start,
                "nested select inside a column list is not supported",
            ));
        }
        if tok.depth > depth {
            continue;
        }
        if tok.kind == Lexeme::Comma {
            segments.push(seg_start..j);
            seg_start = j + 1;
        } else if is_keyword(sql, tok, "from") {
            segments.push(seg_start..j);
            closed = true;
            break;
        }
    }

    if !closed {
        return Err(DbtGenError::malformed(
            select.span.start,
            "select without a matching from",
        ));
    }
    if let Some(first) = segments.first().and_then(|seg| tokens.get(seg.start))
        && is_keyword(sql, first, "distinct")
    {
        return Err(DbtGenError::malformed(
            first.span.start,
            "select distinct is not supported",
        ));
    }

    let mut columns = Vec::with_capacity(segments.len());
    for (position, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            let at = tokens.get(seg.start).map_or(sql.len(), |t| t.span.start);
            return Err(DbtGenError::malformed(at, "empty entry in column list"));
        }
        let mut col = column(sql, &tokens[seg.clone()], depth, position);
        if let Some(next) = segments.get(position + 1) {
            let gap = tokens[seg.end - 1].span.end..tokens[next.start].span.start;
            col.comments = comments(&sql[gap]);
        }
        columns.push(col);
    }

    if let [only] = columns.as_slice()
        && (only.expression == "*" || only.expression.ends_with(".*"))
    {
        return Ok(None);
    }

    let list_start = tokens[segments[0].start].span.start;
    let list_end = tokens[segments[segments.len() - 1].end - 1].span.end;
    let gap = &sql[select.span.end..list_start];
    let indent = gap.rfind('\n').map(|nl| gap[nl + 1..].to_string());

    Ok(Some(Projection {
        columns,
        list: list_start..list_end,
        indent,
    }))
}

/// Comments in the separator between two columns. The gap holds only
/// whitespace, comments and the comma.
fn comments(gap: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = gap;
    while !rest.is_empty() {
        match alt((line_comment, block_comment))(rest) {
            Ok((next, comment)) => {
                found.push(comment.trim_end().to_string());
                rest = next;
            }
            Err(_) => {
                let mut chars = rest.chars();
                chars.next();
                rest = chars.as_str();
            }
        }
    }
    found
}

/// Build a column from one comma-separated entry.
fn column(sql: &str, seg: &[Token], depth: usize, position: usize) -> Column {
    let start = seg[0].span.start;
    let end = seg[seg.len() - 1].span.end;

    if let [.., as_kw, alias] = seg
        && seg.len() >= 3
        && alias.kind == Lexeme::Word
        && alias.depth == depth
        && as_kw.depth == depth
        && is_keyword(sql, as_kw, "as")
    {
        let expression = sql[start..as_kw.span.start].trim_end();
        return Column::new(expression, Some(sql[alias.span.clone()].to_string()), position);
    }

    Column::new(&sql[start..end], None, position)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_MODEL: &str = "with source as (

    select * from {{ source('adwords', 'accounts') }}

),

renamed as (

    select
        canmanageclients,
        currencycode,
        customerid,
        _sdc_batched_at

    from source

)

select * from renamed
";

    fn names(sql: &str) -> Vec<String> {
        extract(sql)
            .unwrap()
            .into_iter()
            .map(|c| c.source_name)
            .collect()
    }

    #[test]
    fn test_base_model_columns() {
        let cols = extract(BASE_MODEL).unwrap();
        let names: Vec<&str> = cols.iter().map(|c| c.source_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["canmanageclients", "currencycode", "customerid", "_sdc_batched_at"]
        );
        assert_eq!(cols[3].position, 3);
        assert!(cols[3].is_metadata);
    }

    #[test]
    fn test_projection_span_and_indent() {
        let projection = locate(BASE_MODEL).unwrap();
        assert_eq!(projection.indent.as_deref(), Some("        "));
        let list = &BASE_MODEL[projection.list.clone()];
        assert!(list.starts_with("canmanageclients,"));
        assert!(list.ends_with("_sdc_batched_at"));
    }

    #[test]
    fn test_commas_inside_parentheses() {
        let sql = "select coalesce(a, b) as c, cast(d as int64) as d, e from t";
        let cols = extract(sql).unwrap();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0].source_name, "c");
        assert_eq!(cols[0].expression, "coalesce(a, b)");
        assert_eq!(cols[1].expression, "cast(d as int64)");
        assert_eq!(cols[2].source_name, "e");
        assert!(!cols[2].is_aliased());
    }

    #[test]
    fn test_unaliased_expression_keeps_text() {
        let cols = extract("select cast(d as int64) from t").unwrap();
        assert_eq!(cols[0].source_name, "cast(d as int64)");
    }

    #[test]
    fn test_keywords_are_case_insensitive_whole_words() {
        assert_eq!(
            names("SELECT selected_at, from_date, Fromage FROM t"),
            vec!["selected_at", "from_date", "Fromage"]
        );
    }

    #[test]
    fn test_skips_strings_comments_and_templates() {
        let sql = "select
    'a, b' as pair, -- trailing, comment
    /* block, (comment */ x,
    {{ dbt_utils.star(from=ref('t'), except=['y']) }} as starred
from t";
        assert_eq!(names(sql), vec!["pair", "x", "starred"]);
    }

    #[test]
    fn test_quoted_identifiers() {
        assert_eq!(
            names("select \"CustomerID\", `select` as kw from t"),
            vec!["\"CustomerID\"", "kw"]
        );
    }

    #[test]
    fn test_leading_comma_layout() {
        let sql = "select\n    a\n    , b\n    , c\nfrom t";
        assert_eq!(names(sql), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_single_line_has_no_indent() {
        let projection = locate("select a, b from t").unwrap();
        assert_eq!(projection.indent, None);
    }

    #[test]
    fn test_missing_select_is_malformed() {
        let err = extract("with x as (1)").unwrap_err();
        assert!(matches!(err, DbtGenError::MalformedInput { .. }));
    }

    #[test]
    fn test_select_without_from_is_malformed() {
        let err = extract("select a, b").unwrap_err();
        assert!(err.to_string().contains("without a matching from"));
    }

    #[test]
    fn test_star_only_is_malformed() {
        let err = extract("select * from renamed").unwrap_err();
        assert!(err.to_string().contains("only star projections"));
    }

    #[test]
    fn test_nested_select_is_malformed() {
        let err = extract("select a, (select max(b) from u) as m from t").unwrap_err();
        assert!(err.to_string().contains("nested select"));
    }

    #[test]
    fn test_union_is_malformed() {
        let err = extract("select a from t union all select b from u").unwrap_err();
        assert!(err.to_string().contains("more than one explicit column list"));
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let err = extract("select coalesce(a, b as c from t").unwrap_err();
        match err {
            DbtGenError::MalformedInput { position, message } => {
                assert_eq!(position, 15);
                assert!(message.contains("never closed"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = extract("select a) from t").unwrap_err();
        assert!(err.to_string().contains("unexpected ')'"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = extract("select 'abc from t").unwrap_err();
        assert!(err.to_string().contains("unterminated string literal"));
    }

    #[test]
    fn test_trailing_comma_is_malformed() {
        let err = extract("select a, b, from t").unwrap_err();
        assert!(err.to_string().contains("empty entry"));
    }

    #[test]
    fn test_comments_between_columns_are_kept() {
        let sql = "select\n    a, -- account\n    b /* balance */\n    , c\nfrom t";
        let cols = extract(sql).unwrap();
        assert_eq!(cols[0].comments, vec!["-- account"]);
        assert_eq!(cols[1].comments, vec!["/* balance */"]);
        assert!(cols[2].comments.is_empty());
    }

    #[test]
    fn test_trailing_identifier() {
        assert_eq!(trailing_identifier("customerid"), Some("customerid"));
        assert_eq!(trailing_identifier("src.CustomerID"), Some("CustomerID"));
        assert_eq!(trailing_identifier("db.src.\"Customer ID\""), Some("\"Customer ID\""));
        assert_eq!(trailing_identifier("`proj.ds`.tbl"), Some("tbl"));
        assert_eq!(trailing_identifier("UPPER(Name)"), None);
        assert_eq!(trailing_identifier("a + b"), None);
        assert_eq!(trailing_identifier("1.5"), None);
        assert_eq!(trailing_identifier("'text'"), None);
    }

    #[test]
    fn test_distinct_is_rejected() {
        let err = extract("select distinct a from t").unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }
}
