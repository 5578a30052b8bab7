/// Column width of a code point: 2 for East Asian wide and fullwidth forms.
pub fn char_width(c: char) -> usize {
    let r = c as u32;
    let wide = r >= 0x1100
        && (r <= 0x115f
            || r == 0x2329
            || r == 0x232a
            || ((0x2e80..=0xa4cf).contains(&r) && r != 0x303f)
            || (0xac00..=0xd7a3).contains(&r)
            || (0xf900..=0xfaff).contains(&r)
            || (0xfe30..=0xfe6f).contains(&r)
            || (0xff00..=0xff60).contains(&r)
            || (0xffe0..=0xffe6).contains(&r)
            || (0x20000..=0x2fffd).contains(&r)
            || (0x30000..=0x3fffd).contains(&r));
    if wide {
        2
    } else {
        1
    }
}

pub fn display_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

/// Frames `msg` in the "sudden death" speech balloon, one body row per line.
///
/// ```text
/// ＿人人人人人人＿
/// ＞　突然の死　＜
/// ￣ＹＹＹＹＹＹ￣
/// ```
pub fn sudden_death(msg: &str) -> String {
    let lines: Vec<&str> = msg.split('\n').collect();
    let widths: Vec<usize> = lines.iter().map(|line| display_width(line)).collect();
    let max_width = widths.iter().copied().max().unwrap_or(0);
    let span = max_width / 2 + 2;

    let mut out = format!("＿{}＿\n", "人".repeat(span));
    for (line, width) in lines.iter().zip(&widths) {
        out.push_str("＞　");
        out.push_str(line);
        out.push_str(&" ".repeat(max_width - width));
        out.push_str("　＜\n");
    }
    out.push_str(&format!("￣{}￣\n", "Ｙ".repeat(span)));
    out
}

/// Boxes `text` `repeat` times, each pass wrapping the previous frame.
pub fn render_box(text: &str, repeat: usize) -> String {
    let mut out = text.to_string();
    for _ in 0..repeat {
        out = sudden_death(out.trim_end_matches('\n'));
    }
    out
}
