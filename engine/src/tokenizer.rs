use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}_]+").expect("valid regex");
}

/// Tokenize text into lower-cased word tokens using NFKC normalization.
///
/// Everything that is not a letter, digit or underscore is a boundary. The same
/// function is applied to documents at index time and to text queries, so a
/// query term matches exactly the tokens it would produce inside a document.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}

/// Tokens of a document as indexed: title followed by body.
pub fn document_tokens(title: &str, body: &str) -> Vec<String> {
    let mut tokens = tokenize(title);
    tokens.extend(tokenize(body));
    tokens
}
