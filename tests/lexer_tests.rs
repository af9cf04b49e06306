use lei::lexer::lex;
use lei::lexer::token::TokenKind;

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source).into_iter().map(|token| token.kind).collect()
}

#[test]
fn lexes_variable_declaration() {
    assert_eq!(
        kinds("var x: int = 42;"),
        vec![
            TokenKind::Var,
            TokenKind::Identifier,
            TokenKind::Colon,
            TokenKind::IntType,
            TokenKind::Equal,
            TokenKind::IntLiteral,
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn lexes_compound_and_logical_operators() {
    assert_eq!(
        kinds("+= -= *= /= == != <= >= && || !"),
        vec![
            TokenKind::PlusEqual,
            TokenKind::MinusEqual,
            TokenKind::StarEqual,
            TokenKind::SlashEqual,
            TokenKind::EqualEqual,
            TokenKind::BangEqual,
            TokenKind::LessEqual,
            TokenKind::GreaterEqual,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::Bang,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn float_needs_digit_after_point() {
    let tokens = lex("3.25 7.");
    assert_eq!(tokens[0].kind, TokenKind::FloatLiteral);
    assert_eq!(tokens[0].lexeme, "3.25");
    assert_eq!(tokens[1].kind, TokenKind::IntLiteral);
    assert_eq!(tokens[2].kind, TokenKind::Error);
    assert_eq!(tokens[2].lexeme, ".");
}

#[test]
fn string_escapes_are_decoded() {
    let tokens = lex(r#""a\tb\n\"q\"\\""#);
    assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
    assert_eq!(tokens[0].lexeme, "a\tb\n\"q\"\\");
}

#[test]
fn unterminated_string_is_an_error_token() {
    let tokens = lex("var s: str = \"open\nvar");
    let error = tokens
        .iter()
        .find(|token| token.kind == TokenKind::Error)
        .expect("error token");
    assert!(error.lexeme.starts_with('"'));
    assert_eq!((error.line, error.column), (1, 14));
    assert_eq!(tokens[tokens.len() - 2].kind, TokenKind::Var);
}

#[test]
fn comments_and_whitespace_are_skipped() {
    let tokens = lex("// header\n  return 1; // trailing\n");
    assert_eq!(tokens[0].kind, TokenKind::Return);
    assert_eq!((tokens[0].line, tokens[0].column), (2, 3));
    assert_eq!(tokens.len(), 4);
}

#[test]
fn bool_literals_and_type_keywords() {
    assert_eq!(
        kinds("true false bool str void float new"),
        vec![
            TokenKind::BoolLiteral,
            TokenKind::BoolLiteral,
            TokenKind::BoolType,
            TokenKind::StrType,
            TokenKind::VoidType,
            TokenKind::FloatType,
            TokenKind::Identifier,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn stray_characters_become_error_tokens() {
    let tokens = lex("a & b # c");
    let errors: Vec<_> = tokens
        .iter()
        .filter(|token| token.kind == TokenKind::Error)
        .map(|token| token.lexeme.as_str())
        .collect();
    assert_eq!(errors, vec!["&", "#"]);
    assert_eq!(tokens.last().map(|token| token.kind), Some(TokenKind::Eof));
}
