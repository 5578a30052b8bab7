use encoding_rs::{Encoding, UTF_8};
use scraper::node::Element;
use scraper::{ElementRef, Html};

/// Finds the document title, decoded with the charset the page declares
/// before its `<title>`. Pages without a declaration are read as UTF-8.
pub fn extract_title(body: &[u8]) -> Option<String> {
    // Tag and attribute names are ASCII, so a lossy read is enough to find the
    // declaration.
    let probe = Html::parse_document(&String::from_utf8_lossy(body));
    let encoding = declared_charset(&probe)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(body);
    let document = Html::parse_document(&text);
    first_title(&document).filter(|title| !title.is_empty())
}

fn declared_charset(document: &Html) -> Option<String> {
    for node in document.tree.root().descendants() {
        let Some(element) = node.value().as_element() else {
            continue;
        };
        match element.name() {
            "title" => return None,
            "meta" => {
                if let Some(charset) = meta_charset(element) {
                    return Some(charset);
                }
            }
            _ => {}
        }
    }
    None
}

fn meta_charset(element: &Element) -> Option<String> {
    let attr = |key: &str| {
        element
            .attrs()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.trim().to_ascii_lowercase())
    };

    if let Some(charset) = attr("charset").filter(|v| !v.is_empty()) {
        return Some(charset);
    }
    if attr("http-equiv").as_deref() != Some("content-type") {
        return None;
    }
    attr("content")?.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        (key.trim() == "charset").then(|| value.trim().to_string())
    })
}

fn first_title(document: &Html) -> Option<String> {
    document
        .tree
        .root()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "title")
        .map(|element| element.text().collect::<String>().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{EUC_JP, SHIFT_JIS};

    fn page(head: &str, title: &[u8]) -> Vec<u8> {
        let mut out = format!("<html><head>{head}<title>").into_bytes();
        out.extend_from_slice(title);
        out.extend_from_slice(b"</title></head><body>x</body></html>");
        out
    }

    #[test]
    fn plain_utf8_title() {
        let body = page("", "こんにちは".as_bytes());
        assert_eq!(extract_title(&body).as_deref(), Some("こんにちは"));
    }

    #[test]
    fn http_equiv_shift_jis() {
        let (encoded, _, _) = SHIFT_JIS.encode("日本語のページ");
        let body = page(
            r#"<meta http-equiv="Content-Type" content="text/html; charset=shift_jis">"#,
            &encoded,
        );
        assert_eq!(extract_title(&body).as_deref(), Some("日本語のページ"));
    }

    #[test]
    fn charset_attribute() {
        let (encoded, _, _) = EUC_JP.encode("ようこそ");
        let body = page(r#"<meta charset="EUC-JP">"#, &encoded);
        assert_eq!(extract_title(&body).as_deref(), Some("ようこそ"));
    }

    #[test]
    fn first_declaration_wins() {
        let (encoded, _, _) = SHIFT_JIS.encode("最初");
        let body = page(
            r#"<meta charset="shift_jis"><meta charset="euc-jp">"#,
            &encoded,
        );
        assert_eq!(extract_title(&body).as_deref(), Some("最初"));
    }

    #[test]
    fn declaration_after_title_is_ignored() {
        let body = b"<html><head><title>plain</title><meta charset=\"shift_jis\"></head></html>";
        assert_eq!(extract_title(body).as_deref(), Some("plain"));
    }

    #[test]
    fn unknown_charset_reads_as_utf8() {
        let body = page(r#"<meta charset="x-klingon">"#, "ok".as_bytes());
        assert_eq!(extract_title(&body).as_deref(), Some("ok"));
    }

    #[test]
    fn missing_or_blank_title() {
        assert_eq!(extract_title(b"<html><body>nothing</body></html>"), None);
        assert_eq!(extract_title(b"<html><head><title>  </title></head></html>"), None);
    }
}
