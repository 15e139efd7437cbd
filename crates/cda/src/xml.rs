//! Indented element writer with entity escaping.

pub(crate) struct XmlWriter {
    out: String,
    open: Vec<&'static str>,
}

impl XmlWriter {
    pub(crate) fn new() -> Self {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        out.push('\n');
        Self {
            out,
            open: Vec::new(),
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.open.len() {
            self.out.push_str("  ");
        }
    }

    fn tag(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attrs {
            self.out.push_str(&format!(r#" {key}="{}""#, escape(value)));
        }
    }

    pub(crate) fn start(&mut self, name: &'static str, attrs: &[(&str, &str)]) -> &mut Self {
        self.indent();
        self.tag(name, attrs);
        self.out.push_str(">\n");
        self.open.push(name);
        self
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> &mut Self {
        self.indent();
        self.tag(name, attrs);
        self.out.push_str("/>\n");
        self
    }

    /// `<name>text</name>` on one line; an empty text collapses to `<name/>`.
    pub(crate) fn text(&mut self, name: &str, text: &str) -> &mut Self {
        if text.is_empty() {
            return self.empty(name, &[]);
        }
        self.indent();
        self.tag(name, &[]);
        self.out.push('>');
        self.out.push_str(&escape(text));
        self.out.push_str(&format!("</{name}>\n"));
        self
    }

    pub(crate) fn end(&mut self) -> &mut Self {
        if let Some(name) = self.open.pop() {
            self.indent();
            self.out.push_str(&format!("</{name}>\n"));
        }
        self
    }

    pub(crate) fn finish(mut self) -> String {
        while !self.open.is_empty() {
            self.end();
        }
        self.out
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_and_escapes() {
        let mut w = XmlWriter::new();
        w.start("root", &[("a", "x\"y")])
            .text("t", "1 < 2 & 3")
            .empty("e", &[])
            .text("blank", "");
        let xml = w.finish();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <root a=\"x&quot;y\">\n  \
             <t>1 &lt; 2 &amp; 3</t>\n  \
             <e/>\n  \
             <blank/>\n\
             </root>\n"
        );
    }
}
