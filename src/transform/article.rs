use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::entities::literature::PubmedAbstract;
use crate::error::ScoutError;
use crate::sources::pubmed::PUBMED_API;

/// Whether `name`, opened inside `parent`, holds text the article record keeps.
fn captured_field(name: &str, parent: Option<&str>) -> bool {
    match name {
        "ArticleTitle" | "AbstractText" | "Keyword" => true,
        "PMID" => parent == Some("MedlineCitation"),
        "LastName" | "ForeName" => parent == Some("Author"),
        "Title" => parent == Some("Journal"),
        "Year" | "Month" | "Day" => parent == Some("PubDate"),
        "DescriptorName" => parent == Some("MeshHeading"),
        _ => false,
    }
}

#[derive(Default)]
struct ArticleBuilder {
    pmid: Option<String>,
    title: String,
    abstract_sections: Vec<String>,
    section_label: Option<String>,
    authors: Vec<String>,
    last_name: String,
    fore_name: String,
    journal: Option<String>,
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
    pub_date_done: bool,
    mesh_terms: Vec<String>,
    keywords: Vec<String>,
}

impl ArticleBuilder {
    fn set_field(&mut self, name: &str, value: String) {
        match name {
            "PMID" if self.pmid.is_none() => self.pmid = non_empty(value),
            "ArticleTitle" => self.title = value,
            "AbstractText" => match self.section_label.take() {
                Some(label) => self.abstract_sections.push(format!("{label}: {value}")),
                None if !value.is_empty() => self.abstract_sections.push(value),
                None => {}
            },
            "LastName" => self.last_name = value,
            "ForeName" => self.fore_name = value,
            "Title" if self.journal.is_none() => self.journal = non_empty(value),
            "Year" if !self.pub_date_done => self.year = non_empty(value),
            "Month" if !self.pub_date_done => self.month = non_empty(value),
            "Day" if !self.pub_date_done => self.day = non_empty(value),
            "DescriptorName" if !value.is_empty() => self.mesh_terms.push(value),
            "Keyword" if !value.is_empty() => self.keywords.push(value),
            _ => {}
        }
    }

    fn finish_author(&mut self) {
        let last = std::mem::take(&mut self.last_name);
        let fore = std::mem::take(&mut self.fore_name);
        if last.is_empty() {
            return;
        }
        self.authors.push(if fore.is_empty() {
            last
        } else {
            format!("{last}, {fore}")
        });
    }

    fn build(self) -> Option<PubmedAbstract> {
        let pmid = self.pmid?;
        let pub_date = self.year.map(|year| {
            let mut date = year;
            if let Some(month) = self.month {
                date.push('-');
                date.push_str(&month);
                if let Some(day) = self.day {
                    date.push('-');
                    date.push_str(&day);
                }
            }
            date
        });
        Some(PubmedAbstract {
            pmid,
            title: Some(self.title).filter(|t| !t.is_empty()),
            abstract_text: Some(self.abstract_sections.join(" ")).filter(|a| !a.is_empty()),
            authors: self.authors,
            journal: self.journal,
            pub_date,
            mesh_terms: self.mesh_terms,
            keywords: self.keywords,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

fn parse_error(err: impl std::fmt::Display) -> ScoutError {
    ScoutError::api(PUBMED_API, format!("Failed to parse XML: {err}"))
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Parses an `efetch` (`rettype=abstract`, `retmode=xml`) `PubmedArticleSet`.
///
/// Text inside inline markup (`<i>`, `<sup>`) is kept. Structured abstracts become
/// `"LABEL: text"` sections joined by spaces. Only the first `PubDate` counts, and
/// it is rendered as `YYYY[-Mon[-DD]]`.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<PubmedAbstract>, ScoutError> {
    let mut reader = Reader::from_str(xml);
    let mut articles = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<ArticleBuilder> = None;
    // Depth of the element whose text is being collected.
    let mut capture_depth: Option<usize> = None;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Start(e) => {
                let name = element_name(&e);
                if name == "PubmedArticle" {
                    current = Some(ArticleBuilder::default());
                }
                if let Some(article) = current.as_mut()
                    && capture_depth.is_none()
                    && captured_field(&name, stack.last().map(String::as_str))
                {
                    if name == "AbstractText" {
                        article.section_label = e
                            .try_get_attribute("Label")
                            .map_err(parse_error)?
                            .map(|a| a.unescape_value().map(|v| v.trim().to_string()))
                            .transpose()
                            .map_err(parse_error)?
                            .filter(|l| !l.is_empty());
                    }
                    capture_depth = Some(stack.len() + 1);
                    text.clear();
                }
                stack.push(name);
            }
            Event::Text(t) if capture_depth.is_some() => {
                text.push_str(&t.unescape().map_err(parse_error)?);
            }
            Event::CData(c) if capture_depth.is_some() => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::End(_) => {
                let depth = stack.len();
                let Some(name) = stack.pop() else {
                    continue;
                };
                if capture_depth == Some(depth) {
                    capture_depth = None;
                    if let Some(article) = current.as_mut() {
                        article.set_field(&name, text.trim().to_string());
                    }
                }
                match name.as_str() {
                    "Author" => {
                        if let Some(article) = current.as_mut() {
                            article.finish_author();
                        }
                    }
                    "PubDate" => {
                        if let Some(article) = current.as_mut() {
                            article.pub_date_done = true;
                        }
                    }
                    "PubmedArticle" => {
                        if let Some(article) = current.take().and_then(ArticleBuilder::build) {
                            articles.push(article);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(articles)
}
