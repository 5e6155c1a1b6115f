// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Latency table scraped from the public cloudping round-trip matrix.
//!
//! The page contains one `<th class="region_title">` per region, followed by
//! the row-major matrix of round-trip times as `<td>` cells. Cells marking
//! the row and column headers carry the classes `source` and `destination`.

use log::debug;

use super::{DistanceTable, DistanceTableError};

/// Address of the cloudping latency matrix.
pub const CLOUDPING_URL: &str = "https://www.cloudping.co/grid";

/// Fetches and parses the latency matrix at `url`.
///
/// # Errors
///
/// Fails if the request fails, the status code is not 200,
/// or the page does not contain a matrix.
pub async fn fetch(url: &str) -> Result<DistanceTable, DistanceTableError> {
    debug!("fetching latency table from {url}");
    let response = reqwest::get(url).await?;
    let status = response.status();
    if status.as_u16() != 200 {
        return Err(DistanceTableError::Status {
            code: status.as_u16(),
        });
    }
    let body = response.text().await?;
    parse(&body)
}

/// Parses the cloudping HTML page into a [`DistanceTable`].
///
/// Cells that do not hold a number are recorded as a 0 ms sample.
///
/// # Errors
///
/// Fails if the page lists no regions, or if the number of latency cells
/// is not the square of the number of regions.
pub fn parse(html: &str) -> Result<DistanceTable, DistanceTableError> {
    let mut regions = Vec::new();
    let mut cells = Vec::new();
    for element in Elements::new(html) {
        match element.tag {
            "th" if element.has_class("region_title") => regions.push(element.text()),
            "td" if !(element.has_class("destination") || element.has_class("source")) => {
                cells.push(element.text().parse::<f64>().unwrap_or(0.0));
            }
            _ => {}
        }
    }

    if regions.is_empty() {
        return Err(DistanceTableError::MalformedPage(
            "no region titles found".to_owned(),
        ));
    }
    let expected = regions.len() * regions.len();
    if cells.len() != expected {
        return Err(DistanceTableError::MalformedPage(format!(
            "{} latency cells for {} regions, expected {expected}",
            cells.len(),
            regions.len()
        )));
    }

    let mut table = DistanceTable::new();
    for region in &regions {
        table.add_titled_region(region);
    }
    let n = regions.len();
    debug!("parsed {n} regions from latency page");
    for (i, rtt) in cells.into_iter().enumerate() {
        table.insert(&regions[i / n], &regions[i % n], rtt);
    }
    Ok(table)
}

/// A `<th>` or `<td>` element found in an HTML document.
struct Element<'a> {
    tag: &'a str,
    attributes: &'a str,
    inner: &'a str,
}

impl Element<'_> {
    fn has_class(&self, class: &str) -> bool {
        let Some(start) = self.attributes.find("class=") else {
            return false;
        };
        let value = &self.attributes[start + "class=".len()..];
        let value = match value.chars().next() {
            Some(q @ ('"' | '\'')) => value[1..].split(q).next().unwrap_or(""),
            _ => value.split_whitespace().next().unwrap_or(""),
        };
        value.split_whitespace().any(|c| c == class)
    }

    /// Gives the text content with all nested tags removed.
    fn text(&self) -> String {
        let mut text = String::new();
        let mut in_tag = false;
        for c in self.inner.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                c if !in_tag => text.push(c),
                _ => {}
            }
        }
        text.trim().to_owned()
    }
}

/// Iterator over the table cells of an HTML document, in document order.
struct Elements<'a> {
    rest: &'a str,
}

impl<'a> Elements<'a> {
    const fn new(html: &'a str) -> Self {
        Self { rest: html }
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Element<'a>> {
        loop {
            let start = self.rest.find('<')?;
            let after = &self.rest[start + 1..];
            let end = after.find('>')?;
            let open = &after[..end];
            let body = &after[end + 1..];
            let tag_len = open
                .find(|c: char| c.is_whitespace() || c == '/')
                .unwrap_or(open.len());
            let tag = &open[..tag_len];
            if tag != "th" && tag != "td" {
                self.rest = body;
                continue;
            }

            let (inner, rest) = split_cell(body, tag);
            self.rest = rest;
            return Some(Element {
                tag,
                attributes: &open[tag_len..],
                inner,
            });
        }
    }
}

/// Tags that implicitly close an open table cell.
const CELL_TERMINATORS: [&str; 6] = ["<td", "<th", "<tr", "</tr", "</tbody", "</table"];

/// Splits a cell body into its content and the remaining document.
///
/// End tags of cells are optional in HTML, so a cell also ends where the
/// next cell or row starts. Only an explicit end tag is consumed.
fn split_cell<'a>(body: &'a str, tag: &str) -> (&'a str, &'a str) {
    let close = format!("</{tag}");
    let explicit = body.find(&close);
    let implicit = CELL_TERMINATORS
        .iter()
        .filter_map(|t| body.find(t))
        .min();
    match (explicit, implicit) {
        (Some(end), Some(next)) if next < end => (&body[..next], &body[next..]),
        (Some(end), _) => {
            let after = &body[end..];
            let skip = after.find('>').map_or(after.len(), |i| i + 1);
            (&body[..end], &after[skip..])
        }
        (None, Some(next)) => (&body[..next], &body[next..]),
        (None, None) => (body, ""),
    }
}
