use crate::error::FanoutError;
use crate::helpers::xml::RawAttributes;
use crate::template::package::FlatPart;

/// A relationship part, such as `_rels/.rels` or `xl/_rels/workbook.xml.rels`
#[derive(Clone, Debug)]
pub(crate) struct Relationships(FlatPart);

impl Relationships {
    pub(crate) fn parse(xml: &str) -> Result<Relationships, FanoutError> {
        Ok(Relationships(FlatPart::parse(xml)?))
    }

    fn find(&self, id: &str) -> Option<&RawAttributes> {
        self.0
            .items
            .iter()
            .map(|(_, attributes)| attributes)
            .find(|attributes| attributes.get("Id") == Some(id))
    }

    /// Unescaped target of a relationship
    pub(crate) fn target(&self, id: &str) -> Result<Option<String>, FanoutError> {
        Ok(self.find(id).map(|attributes| attributes.text("Target")).transpose()?.flatten())
    }

    /// Relationship type URI
    pub(crate) fn kind(&self, id: &str) -> Result<Option<String>, FanoutError> {
        Ok(self.find(id).map(|attributes| attributes.text("Type")).transpose()?.flatten())
    }

    /// Id of the first relationship whose type ends with `suffix`
    pub(crate) fn find_by_kind(&self, suffix: &str) -> Option<String> {
        self.0
            .items
            .iter()
            .map(|(_, attributes)| attributes)
            .find(|attributes| attributes.get("Type").map(|kind| kind.ends_with(suffix)).unwrap_or(false))
            .and_then(|attributes| attributes.get("Id"))
            .map(str::to_owned)
    }

    /// Adds a relationship and returns its new id
    pub(crate) fn add(&mut self, kind: &str, target: &str) -> String {
        let next = self
            .0
            .items
            .iter()
            .filter_map(|(_, attributes)| attributes.get("Id"))
            .filter_map(|id| id.strip_prefix("rId"))
            .filter_map(|number| number.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("rId{next}");
        let mut attributes = RawAttributes::default();
        attributes.set("Id", id.as_str());
        attributes.set_text("Type", kind);
        attributes.set_text("Target", target);
        let name = self.0.item_name("Relationship");
        self.0.items.push((name, attributes));
        id
    }

    /// Removes a relationship, returning its unescaped target
    pub(crate) fn remove(&mut self, id: &str) -> Result<Option<String>, FanoutError> {
        let target = self.target(id)?;
        self.0.items.retain(|(_, attributes)| attributes.get("Id") != Some(id));
        Ok(target)
    }

    pub(crate) fn to_xml(&self) -> String {
        self.0.to_xml()
    }
}

/// Package content type table (`[Content_Types].xml`)
#[derive(Clone, Debug)]
pub(crate) struct ContentTypes(FlatPart);

impl ContentTypes {
    pub(crate) fn parse(xml: &str) -> Result<ContentTypes, FanoutError> {
        Ok(ContentTypes(FlatPart::parse(xml)?))
    }

    /// Overrides are keyed by absolute part names (`/xl/styles.xml`)
    fn is_override_of(attributes: &RawAttributes, path: &str) -> bool {
        attributes
            .get("PartName")
            .map(|name| name.trim_start_matches('/').eq_ignore_ascii_case(path.trim_start_matches('/')))
            .unwrap_or(false)
    }

    /// Content type registered for one part
    pub(crate) fn override_for(&self, path: &str) -> Result<Option<String>, FanoutError> {
        let content_type = self
            .0
            .items
            .iter()
            .find(|(name, attributes)| name.ends_with("Override") && Self::is_override_of(attributes, path))
            .map(|(_, attributes)| attributes.text("ContentType"))
            .transpose()?
            .flatten();
        Ok(content_type)
    }

    pub(crate) fn add_override(&mut self, path: &str, content_type: &str) {
        self.remove_override(path);
        let mut attributes = RawAttributes::default();
        attributes.set_text("PartName", &format!("/{}", path.trim_start_matches('/')));
        attributes.set_text("ContentType", content_type);
        let name = self.0.item_name("Override");
        self.0.items.push((name, attributes));
    }

    pub(crate) fn remove_override(&mut self, path: &str) {
        self.0
            .items
            .retain(|(name, attributes)| !(name.ends_with("Override") && Self::is_override_of(attributes, path)));
    }

    pub(crate) fn to_xml(&self) -> String {
        self.0.to_xml()
    }
}

/// Path of the relationship part that belongs to `path`
pub(crate) fn relationships_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((directory, file)) => format!("{directory}/_rels/{file}.rels"),
        None => format!("_rels/{path}.rels"),
    }
}

/// Package path of a relationship target. Relative targets are resolved against
/// the directory of `source`, the part owning the relationship; `""` stands for
/// the package root.
pub(crate) fn resolve_target(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_owned();
    }
    let mut segments: Vec<&str> = match source.rsplit_once('/') {
        Some((directory, _)) => directory.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => (),
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    segments.join("/")
}
