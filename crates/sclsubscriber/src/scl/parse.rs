use super::{ElementId, SclDocument, SclNode};
use anyhow::{bail, Context};
use quick_xml::{
    events::{BytesEnd, BytesStart, Event},
    Reader,
};
use std::io::BufRead;
use std::path::Path;
use std::str::from_utf8;
use tokio::fs;
use tracing::trace;

/* nesting deeper than this is not an SCL file any more */
pub const SX_MAX_XML_NEST: usize = 64;

/************************************************************************/
/*			1入口函数 start					*/
/************************************************************************/
impl SclDocument {
    /// Reads an SCL file from disk.
    pub async fn load(xmlfilename: impl AsRef<Path>) -> crate::Result<SclDocument> {
        let path = xmlfilename.as_ref();
        let sclstr = fs::read_to_string(path)
            .await
            .context(format!("open scl file {} failed", path.display()))?;
        SclDocument::parse_str(&sclstr)
    }

    /// Parses SCL text. Comments, processing instructions and the XML
    /// declaration are dropped, as are whitespace-only text runs. Other
    /// element text is kept verbatim on its owner.
    pub fn parse_str(sclstr: &str) -> crate::Result<SclDocument> {
        let mut reader = Reader::from_str(sclstr);

        let mut doc: Option<SclDocument> = None;
        /*当前打开的元素栈     */
        let mut stack: Vec<ElementId> = Vec::new();
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let tag_info = get_start_tag_info(e, &reader)?;
                    let id = open_element(&mut doc, &stack, tag_info)?;
                    if stack.len() >= SX_MAX_XML_NEST {
                        bail!("Start tag exceeds max nesting level {}", SX_MAX_XML_NEST);
                    }
                    stack.push(id);
                }
                Ok(Event::Empty(ref e)) => {
                    let tag_info = get_start_tag_info(e, &reader)?;
                    open_element(&mut doc, &stack, tag_info)?;
                }
                Ok(Event::End(ref e)) => {
                    let end_tag = get_end_tag_info(e)?;
                    let (Some(doc), Some(open)) = (doc.as_ref(), stack.pop()) else {
                        bail!("Unexpected End tag {}. Invalid nesting.", end_tag);
                    };
                    if doc.tag(open) != end_tag {
                        bail!(
                            "XML malformed: found {}, expected {}",
                            end_tag,
                            doc.tag(open)
                        );
                    }
                }
                Ok(Event::Text(e)) => {
                    let txt = e.unescape().context("get txt info err")?;
                    /* indentation between elements, real text keeps its padding */
                    if !txt.trim().is_empty() {
                        push_text(&mut doc, &stack, &txt);
                    }
                }
                Ok(Event::CData(e)) => {
                    let raw = e.into_inner();
                    let txt = from_utf8(raw.as_ref())?;
                    push_text(&mut doc, &stack, txt);
                }
                Ok(Event::Eof) => break,
                Err(e) => bail!("Error at position {}: {:?}", reader.buffer_position(), e),
                _ => (),
            }
            buf.clear();
        }

        if !stack.is_empty() {
            bail!("XML malformed: {} element(s) left open at end of file", stack.len());
        }
        match doc {
            Some(doc) => {
                trace!(elements = doc.nodes.len(), "scl document parsed");
                Ok(doc)
            }
            None => bail!("no root element in scl text"),
        }
    }
}
/************************************************************************/
/*			1入口函数 end					*/
/************************************************************************/

/************************************************************************/
/*			2 解析辅助 start					*/
/************************************************************************/
//解析出来的tag信息还是要转成utf8
struct TagInfo {
    tag: String,
    atts: Vec<(String, String)>,
}

fn open_element(
    doc: &mut Option<SclDocument>,
    stack: &[ElementId],
    tag_info: TagInfo,
) -> crate::Result<ElementId> {
    if doc.is_none() {
        *doc = Some(SclDocument::with_root(&tag_info.tag, tag_info.atts));
        return Ok(ElementId(0));
    }
    let Some(doc) = doc.as_mut() else {
        bail!("document root missing");
    };
    let Some(parent) = stack.last().copied() else {
        bail!("second root element {} found", tag_info.tag);
    };
    let id = doc.alloc(SclNode {
        tag: tag_info.tag,
        attrs: tag_info.atts,
        text: None,
        parent: Some(parent),
        children: Vec::new(),
    });
    doc.nodes[parent.0].children.push(id);
    Ok(id)
}

fn push_text(doc: &mut Option<SclDocument>, stack: &[ElementId], txt: &str) {
    /* text outside the root element is ignored */
    if let (Some(doc), Some(owner)) = (doc.as_mut(), stack.last()) {
        doc.nodes[owner.0]
            .text
            .get_or_insert_with(String::new)
            .push_str(txt);
    }
}

///辅助函数 用来解析 tag 为拥有的 string
fn get_start_tag_info<'a, B: BufRead>(
    btstart: &BytesStart<'a>,
    reader: &Reader<B>,
) -> crate::Result<TagInfo> {
    let tag_name = btstart.name();
    let tag = from_utf8(tag_name.as_ref())?.to_string();
    let mut atts = Vec::new();
    for att in btstart.attributes() {
        let att = att?;
        let value = att.decode_and_unescape_value(reader)?.to_string();
        let key = from_utf8(att.key.as_ref())?.to_string();
        atts.push((key, value));
    }

    Ok(TagInfo { tag, atts })
}

fn get_end_tag_info(btend: &BytesEnd<'_>) -> crate::Result<String> {
    let tag_name = btend.name();
    Ok(from_utf8(tag_name.as_ref())?.to_string())
}
/************************************************************************/
/*			2 解析辅助 end					*/
/************************************************************************/
