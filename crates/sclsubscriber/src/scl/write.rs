use super::{ElementId, SclDocument};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

impl SclDocument {
    /// Serializes the attached tree back to SCL text, document order and
    /// attribute order preserved.
    pub fn to_xml_string(&self) -> crate::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write_element(&mut writer, self.root())?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    fn write_element(&self, writer: &mut Writer<Vec<u8>>, id: ElementId) -> crate::Result<()> {
        let tag = self.tag(id);
        let mut start = BytesStart::new(tag);
        for (key, value) in self.attrs(id) {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        let text = self.text(id);
        if self.children(id).is_empty() && text.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        if !text.is_empty() {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in self.children(id) {
            self.write_element(writer, *child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }
}
