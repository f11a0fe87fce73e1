//! XML-RPC response decoding: a descent over the `methodResponse` grammar on
//! top of the quick-xml pull parser.
//!
//! The raw event stream is first normalized into [`Token`]s: comments,
//! processing instructions and the doctype disappear, entity and character
//! references become text, CDATA becomes text and empty elements become an
//! open/close pair. The grammar functions then consume tokens, each one
//! positioned just after the opening tag it handles and returning once the
//! matching end tag has been consumed. Nested structs and arrays are tracked
//! on an explicit frame stack instead of the call stack.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesRef, Event};
use quick_xml::name::QName;
use rpcstack_model::{Fault, Value};

use crate::config::{DecoderConfig, DuplicateMembers};
use crate::error::DecodeError;
use crate::outcome::ResponseOutcome;
use crate::registry::{TypeRegistry, ValueType};

/// The result of a well-formed response: the returned value, or the fault the
/// server reported instead.
pub type MethodResponse = Result<Value, Fault>;

/// XML-RPC response decoder.
///
/// Holds the configuration and the type registry built from it. Both are
/// immutable, so one `Decoder` can be shared across threads and reused for
/// any number of documents.
///
/// # Examples
///
/// ```
/// use rpcstack_xml::{Decoder, DecoderConfig, ResponseOutcome};
///
/// let decoder = Decoder::new(DecoderConfig::default());
/// let outcome = decoder.decode_slice(
///     b"<methodResponse><params><param><value>hi</value></param></params></methodResponse>",
/// );
/// assert!(matches!(outcome, ResponseOutcome::Value(v) if v.as_str() == Some("hi")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecoderConfig,
    registry: TypeRegistry,
}

impl Decoder {
    /// Create a decoder for the given configuration.
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        let registry = TypeRegistry::new(&config);
        Self { config, registry }
    }

    /// The configuration this decoder was built with.
    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// The type registry this decoder dispatches through.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Decode one response document from a stream.
    pub fn decode<R: BufRead>(&self, reader: R) -> ResponseOutcome {
        self.try_decode(reader).into()
    }

    /// Decode one response document held in memory.
    pub fn decode_slice(&self, xml: &[u8]) -> ResponseOutcome {
        self.decode(xml)
    }

    /// Decode one response document, keeping faults and decode errors on
    /// separate channels.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the stream cannot be read, the XML is not
    /// well-formed, or the document does not follow the XML-RPC response
    /// grammar. A server fault is not an error: it is `Ok(Err(fault))`.
    pub fn try_decode<R: BufRead>(&self, reader: R) -> Result<MethodResponse, DecodeError> {
        let result = ResponseParser::new(reader, self).parse_document();
        match &result {
            Ok(Ok(value)) => {
                tracing::debug!(value_type = value.type_name(), "decoded XML-RPC response value");
            }
            Ok(Err(fault)) => {
                tracing::debug!(code = fault.code, "decoded XML-RPC fault");
            }
            Err(err) => {
                tracing::debug!(kind = err.kind.as_str(), error = %err, "failed to decode XML-RPC response");
            }
        }
        result
    }
}

/// Normalized XML content.
#[derive(Debug)]
enum Token {
    Open(String),
    Close,
    Text(String),
    Eof,
}

/// Tokens that may appear where only elements are allowed; whitespace-only
/// text has already been dropped.
#[derive(Debug)]
enum Markup {
    Open(String),
    Close,
    Eof,
}

/// A container whose closing tag has not been reached yet.
#[derive(Debug)]
enum Frame {
    /// Inside `<array><data>`.
    Array(Vec<Value>),
    /// Inside `<struct>`, possibly part-way through a `<member>`.
    Struct {
        members: Vec<(String, Value)>,
        member: Option<Member>,
    },
}

/// A `<member>` whose parts may arrive in either order.
#[derive(Debug, Default)]
struct Member {
    name: Option<String>,
    value: Option<Value>,
}

impl Member {
    fn finish(self) -> Result<(String, Value), DecodeError> {
        let name = self
            .name
            .ok_or_else(|| DecodeError::structural("<member> is missing <name>"))?;
        let value = self.value.ok_or_else(|| {
            DecodeError::structural(format!("<member> '{name}' is missing <value>"))
        })?;
        Ok((name, value))
    }
}

/// What a `<value>` turned out to hold once its first child was read.
enum Step {
    /// A complete value; its `</value>` has been consumed.
    Done(Value),
    /// A container was opened and must be filled from the stream.
    Nested(Frame),
}

struct ResponseParser<'d, R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    decoder: &'d Decoder,
    /// A close token is owed for the last `<empty/>` element.
    pending_close: bool,
    seen_declaration: bool,
}

impl<'d, R: BufRead> ResponseParser<'d, R> {
    fn new(reader: R, decoder: &'d Decoder) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buf: Vec::new(),
            decoder,
            pending_close: false,
            seen_declaration: false,
        }
    }

    // -----------------------------------------------------------------------
    // Grammar
    // -----------------------------------------------------------------------

    fn parse_document(&mut self) -> Result<MethodResponse, DecodeError> {
        let root = match self.next_markup("document")? {
            Markup::Open(tag) => tag,
            Markup::Close => {
                return Err(DecodeError::malformed("closing tag before root element"));
            }
            Markup::Eof => {
                return Err(DecodeError::structural("missing root element <methodResponse>"));
            }
        };

        if !self.seen_declaration && !self.decoder.config.declaration_optional {
            return Err(DecodeError::structural("missing XML declaration"));
        }
        if root != "methodResponse" {
            return Err(DecodeError::structural(format!(
                "expected root element <methodResponse>, found <{root}>"
            )));
        }

        let response = match self.next_markup("methodResponse")? {
            Markup::Open(tag) if tag == "params" => Ok(self.parse_params()?),
            Markup::Open(tag) if tag == "fault" => Err(self.parse_fault()?),
            Markup::Open(tag) => {
                return Err(DecodeError::structural(format!(
                    "unexpected <{tag}> in <methodResponse>"
                )));
            }
            Markup::Close => {
                return Err(DecodeError::structural(
                    "<methodResponse> must contain <params> or <fault>",
                ));
            }
            Markup::Eof => return Err(unexpected_eof("methodResponse")),
        };

        match self.next_markup("methodResponse")? {
            Markup::Close => {}
            Markup::Open(tag) => {
                return Err(DecodeError::structural(format!(
                    "<methodResponse> must contain exactly one of <params> or <fault>, found extra <{tag}>"
                )));
            }
            Markup::Eof => return Err(unexpected_eof("methodResponse")),
        }

        match self.next_markup("document")? {
            Markup::Eof => Ok(response),
            Markup::Open(tag) => Err(DecodeError::structural(format!(
                "unexpected element <{tag}> after </methodResponse>"
            ))),
            Markup::Close => Err(DecodeError::malformed(
                "unexpected closing tag after </methodResponse>",
            )),
        }
    }

    fn parse_params(&mut self) -> Result<Value, DecodeError> {
        self.expect_open("params", "param")?;
        self.expect_open("param", "value")?;
        let value = self.parse_value()?;
        self.expect_close("param")?;

        match self.next_markup("params")? {
            Markup::Close => Ok(value),
            Markup::Open(tag) => Err(DecodeError::structural(format!(
                "<params> must contain exactly one <param>, found extra <{tag}>"
            ))),
            Markup::Eof => Err(unexpected_eof("params")),
        }
    }

    fn parse_fault(&mut self) -> Result<Fault, DecodeError> {
        self.expect_open("fault", "value")?;
        let value = self.parse_value()?;
        self.expect_close("fault")?;
        fault_from_value(value)
    }

    /// Decode a whole `<value>`, positioned just after its opening tag.
    ///
    /// Open containers live on `stack` rather than the call stack, so nesting
    /// depth costs heap memory only.
    fn parse_value(&mut self) -> Result<Value, DecodeError> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut step = self.open_value()?;
        loop {
            match step {
                Step::Nested(frame) => {
                    self.check_depth(stack.len() + 1)?;
                    stack.push(frame);
                }
                Step::Done(value) => {
                    tracing::trace!(
                        value_type = value.type_name(),
                        depth = stack.len(),
                        "decoded value"
                    );
                    match stack.last_mut() {
                        None => return Ok(value),
                        Some(Frame::Array(items)) => items.push(value),
                        Some(Frame::Struct {
                            member: Some(member),
                            ..
                        }) => member.value = Some(value),
                        Some(Frame::Struct { member: None, .. }) => {
                            return Err(DecodeError::structural("<value> outside <member>"));
                        }
                    }
                }
            }
            step = self.advance(&mut stack)?;
        }
    }

    /// Read the content of a `<value>` up to its first typed child.
    fn open_value(&mut self) -> Result<Step, DecodeError> {
        let mut text = String::new();
        loop {
            match self.next_token()? {
                Token::Text(chunk) => text.push_str(&chunk),
                Token::Close => return Ok(Step::Done(Value::String(text))),
                Token::Open(tag) => {
                    if !text.trim().is_empty() {
                        return Err(DecodeError::structural(format!(
                            "<value> mixes text '{}' with <{tag}>",
                            text.trim()
                        )));
                    }
                    return match self.decoder.registry.resolve(&tag)? {
                        ValueType::Struct => Ok(Step::Nested(Frame::Struct {
                            members: Vec::new(),
                            member: None,
                        })),
                        ValueType::Array => {
                            self.expect_open("array", "data")?;
                            Ok(Step::Nested(Frame::Array(Vec::new())))
                        }
                        scalar => {
                            let text = self.read_text(&tag)?;
                            let value = scalar.decode_scalar(text)?;
                            self.expect_close("value")?;
                            Ok(Step::Done(value))
                        }
                    };
                }
                Token::Eof => return Err(unexpected_eof("value")),
            }
        }
    }

    /// Consume markup inside the innermost open container until a child
    /// `<value>` starts or the container closes.
    fn advance(&mut self, stack: &mut Vec<Frame>) -> Result<Step, DecodeError> {
        loop {
            let Some(frame) = stack.last_mut() else {
                return Err(DecodeError::structural("no open container"));
            };
            match frame {
                Frame::Array(items) => match self.next_markup("data")? {
                    Markup::Open(tag) if tag == "value" => return self.open_value(),
                    Markup::Open(tag) => {
                        return Err(DecodeError::structural(format!(
                            "unexpected <{tag}> in <data>"
                        )));
                    }
                    Markup::Close => {
                        let items = std::mem::take(items);
                        stack.pop();
                        self.expect_close("array")?;
                        self.expect_close("value")?;
                        return Ok(Step::Done(Value::Array(items)));
                    }
                    Markup::Eof => return Err(unexpected_eof("data")),
                },
                Frame::Struct { members, member } => {
                    let Some(current) = member.as_mut() else {
                        match self.next_markup("struct")? {
                            Markup::Open(tag) if tag == "member" => {
                                *member = Some(Member::default());
                            }
                            Markup::Open(tag) => {
                                return Err(DecodeError::structural(format!(
                                    "unexpected <{tag}> in <struct>"
                                )));
                            }
                            Markup::Close => {
                                let members = std::mem::take(members);
                                stack.pop();
                                self.expect_close("value")?;
                                return Ok(Step::Done(Value::Struct(members)));
                            }
                            Markup::Eof => return Err(unexpected_eof("struct")),
                        }
                        continue;
                    };

                    match self.next_markup("member")? {
                        Markup::Open(tag) if tag == "name" => {
                            if current.name.is_some() {
                                return Err(DecodeError::structural(
                                    "<member> has more than one <name>",
                                ));
                            }
                            current.name = Some(self.read_text("name")?);
                        }
                        Markup::Open(tag) if tag == "value" => {
                            if current.value.is_some() {
                                return Err(DecodeError::structural(
                                    "<member> has more than one <value>",
                                ));
                            }
                            return self.open_value();
                        }
                        Markup::Open(tag) => {
                            return Err(DecodeError::structural(format!(
                                "unexpected <{tag}> in <member>"
                            )));
                        }
                        Markup::Close => {
                            if let Some(done) = member.take() {
                                let (name, value) = done.finish()?;
                                self.insert_member(members, name, value)?;
                            }
                        }
                        Markup::Eof => return Err(unexpected_eof("member")),
                    }
                }
            }
        }
    }

    fn insert_member(
        &self,
        members: &mut Vec<(String, Value)>,
        name: String,
        value: Value,
    ) -> Result<(), DecodeError> {
        match members.iter_mut().find(|(existing, _)| *existing == name) {
            None => members.push((name, value)),
            Some(slot) => match self.decoder.config.duplicate_members {
                DuplicateMembers::LastWins => slot.1 = value,
                DuplicateMembers::FirstWins => {}
                DuplicateMembers::Reject => {
                    return Err(DecodeError::structural(format!(
                        "duplicate struct member '{name}'"
                    )));
                }
            },
        }
        Ok(())
    }

    /// `depth` is the number of open struct/array containers.
    fn check_depth(&self, depth: usize) -> Result<(), DecodeError> {
        match self.decoder.config.max_depth {
            Some(max) if depth > max => Err(DecodeError::structural(format!(
                "values nested deeper than {max} levels"
            ))),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------------

    /// Read the text content of the current element and consume its end tag.
    fn read_text(&mut self, tag: &str) -> Result<String, DecodeError> {
        let mut text = String::new();
        loop {
            match self.next_token()? {
                Token::Text(chunk) => text.push_str(&chunk),
                Token::Close => return Ok(text),
                Token::Open(child) => {
                    return Err(DecodeError::structural(format!(
                        "<{tag}> must contain only text, found <{child}>"
                    )));
                }
                Token::Eof => return Err(unexpected_eof(tag)),
            }
        }
    }

    /// Consume the opening tag `name`, which must be the next element inside `parent`.
    fn expect_open(&mut self, parent: &str, name: &str) -> Result<(), DecodeError> {
        match self.next_markup(parent)? {
            Markup::Open(tag) if tag == name => Ok(()),
            Markup::Open(tag) => Err(DecodeError::structural(format!(
                "expected <{name}> in <{parent}>, found <{tag}>"
            ))),
            Markup::Close => Err(DecodeError::structural(format!(
                "missing <{name}> in <{parent}>"
            ))),
            Markup::Eof => Err(unexpected_eof(parent)),
        }
    }

    /// Consume the end tag of `name`, which must have no further children.
    fn expect_close(&mut self, name: &str) -> Result<(), DecodeError> {
        match self.next_markup(name)? {
            Markup::Close => Ok(()),
            Markup::Open(tag) => Err(DecodeError::structural(format!(
                "unexpected <{tag}> in <{name}>"
            ))),
            Markup::Eof => Err(unexpected_eof(name)),
        }
    }

    /// Next token in element-only content of `context`.
    fn next_markup(&mut self, context: &str) -> Result<Markup, DecodeError> {
        loop {
            match self.next_token()? {
                Token::Open(tag) => return Ok(Markup::Open(tag)),
                Token::Close => return Ok(Markup::Close),
                Token::Eof => return Ok(Markup::Eof),
                Token::Text(text) if text.trim().is_empty() => {}
                Token::Text(text) => {
                    return Err(DecodeError::structural(format!(
                        "unexpected text '{}' in <{context}>",
                        text.trim()
                    )));
                }
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, DecodeError> {
        if std::mem::take(&mut self.pending_close) {
            return Ok(Token::Close);
        }

        loop {
            self.buf.clear();
            let token = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => Token::Open(element_name(e.name())?),
                // quick-xml has already checked that end tags match.
                Event::End(_) => Token::Close,
                Event::Empty(e) => {
                    self.pending_close = true;
                    Token::Open(element_name(e.name())?)
                }
                Event::Text(e) => {
                    let decoded = e
                        .decode()
                        .map_err(|err| DecodeError::malformed(err.to_string()))?;
                    let unescaped = quick_xml::escape::unescape(&decoded)
                        .map_err(|err| DecodeError::malformed(err.to_string()))?;
                    Token::Text(unescaped.into_owned())
                }
                Event::CData(e) => Token::Text(
                    e.decode()
                        .map_err(|err| DecodeError::malformed(err.to_string()))?
                        .into_owned(),
                ),
                Event::GeneralRef(e) => Token::Text(resolve_reference(&e)?),
                Event::Decl(_) => {
                    self.seen_declaration = true;
                    continue;
                }
                Event::Eof => Token::Eof,
                // Comments never contribute content; PIs and the doctype carry none.
                Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
            };
            return Ok(token);
        }
    }
}

fn element_name(name: QName<'_>) -> Result<String, DecodeError> {
    std::str::from_utf8(name.as_ref())
        .map(str::to_owned)
        .map_err(|e| DecodeError::malformed(e.to_string()))
}

/// Resolve `&name;` / `&#N;` to its text.
fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, DecodeError> {
    if let Some(ch) = reference
        .resolve_char_ref()
        .map_err(|e| DecodeError::malformed(e.to_string()))?
    {
        return Ok(ch.to_string());
    }

    let name = reference
        .decode()
        .map_err(|e| DecodeError::malformed(e.to_string()))?;
    quick_xml::escape::resolve_predefined_entity(&name)
        .map(str::to_owned)
        .ok_or_else(|| DecodeError::malformed(format!("unknown entity &{name};")))
}

fn unexpected_eof(context: &str) -> DecodeError {
    DecodeError::malformed(format!("unexpected end of document inside <{context}>"))
}

/// Extract `faultCode` and `faultString` from a decoded `<fault>` value.
fn fault_from_value(value: Value) -> Result<Fault, DecodeError> {
    let members = value.into_struct().map_err(|other| {
        DecodeError::structural(format!(
            "fault value must be a struct, found {}",
            other.type_name()
        ))
    })?;

    let mut code = None;
    let mut message = None;
    for (name, value) in members {
        match name.as_str() {
            "faultCode" => code = Some(value),
            "faultString" => message = Some(value),
            _ => {}
        }
    }

    let code = match code {
        Some(Value::Int(code)) => code,
        Some(Value::Long(code)) => i32::try_from(code).map_err(|_| {
            DecodeError::type_coercion(format!("faultCode {code} does not fit in an int"))
        })?,
        Some(other) => {
            return Err(DecodeError::type_coercion(format!(
                "faultCode must be an int, found {}",
                other.type_name()
            )));
        }
        None => return Err(DecodeError::structural("fault struct is missing faultCode")),
    };

    let message = message
        .ok_or_else(|| DecodeError::structural("fault struct is missing faultString"))?
        .into_string()
        .map_err(|other| {
            DecodeError::type_coercion(format!(
                "faultString must be a string, found {}",
                other.type_name()
            ))
        })?;

    Ok(Fault { code, message })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::error::ErrorKind;

    const XML_DECL: &str = r#"<?xml version="1.0"?>"#;

    fn decode_with(config: DecoderConfig, xml: &str) -> Result<MethodResponse, DecodeError> {
        Decoder::new(config).try_decode(xml.as_bytes())
    }

    fn decode(xml: &str) -> Result<MethodResponse, DecodeError> {
        decode_with(DecoderConfig::default(), xml)
    }

    fn decode_value(xml: &str) -> Value {
        decode(xml)
            .expect("document should decode")
            .expect("response should not be a fault")
    }

    fn decode_err(xml: &str) -> DecodeError {
        decode(xml).expect_err("document should be rejected")
    }

    /// Wrap a `<value>` element into a complete success response.
    fn response(value: &str) -> String {
        format!("<methodResponse><params><param>{value}</param></params></methodResponse>")
    }

    // -- response parser surface --------------------------------------------

    #[test]
    fn test_should_decode_simple_response() {
        let xml = format!(
            "{XML_DECL}<methodResponse>  <params>    <param>      \
             <value><string>toto</string></value>    </param>  </params></methodResponse>"
        );
        assert_eq!(decode_value(&xml), Value::from("toto"));
    }

    #[test]
    fn test_should_accept_missing_declaration() {
        let body = "<methodResponse>  <params>    <param>      \
                    <value><string>toto</string></value>    </param>  </params></methodResponse>";
        let with_decl = decode(&format!("{XML_DECL}{body}")).expect("with declaration");
        let without_decl = decode(body).expect("without declaration");
        assert_eq!(without_decl, Ok(Value::from("toto")));
        assert_eq!(with_decl, without_decl);
    }

    #[test]
    fn test_should_decode_fault() {
        let xml = "<methodResponse>  <fault>    <value>      <struct>        <member>\
                   <name>faultCode</name>          <value><int>4</int></value>        </member>\
                   <member>          <name>faultString</name>          \
                   <value><string>error X occurred</string></value>        </member>      \
                   </struct>    </value>  </fault></methodResponse>";

        let fault = decode(xml)
            .expect("document should decode")
            .expect_err("response should be a fault");
        assert_eq!(fault.code, 4);
        assert_eq!(fault.message, "error X occurred");
        assert_eq!(fault.to_string(), "error X occurred [4]");
    }

    #[test]
    fn test_should_ignore_commented_out_sibling_value() {
        let xml = "<methodResponse>  <params>    <param>      \
                   <!--value><string>toto</string></value-->      \
                   <value><string>tata</string></value>    </param>  </params></methodResponse>";
        assert_eq!(decode_value(xml), Value::from("tata"));
    }

    #[test]
    fn test_should_strip_inline_comment() {
        let xml = response("<value><string>ti<!--blah-->ti</string></value>");
        assert_eq!(decode_value(&xml), Value::from("titi"));
    }

    #[test]
    fn test_should_unescape_special_chars() {
        let xml = response("<value><string>to&lt;to</string></value>");
        assert_eq!(decode_value(&xml), Value::from("to<to"));
    }

    #[test]
    fn test_should_reject_missing_method_response() {
        let err = decode_err(
            "  <params>    <param>      <value><string>toto</string></value>    </param>  </params>",
        );
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_reject_missing_params() {
        let err = decode_err(
            "<methodResponse>    <param>      <value><string>toto</string></value>    \
             </param></methodResponse>",
        );
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_reject_missing_param() {
        let err = decode_err(
            "<methodResponse>  <params>      <value><string>toto</string></value>  \
             </params></methodResponse>",
        );
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    // -- text handling -------------------------------------------------------

    #[test]
    fn test_should_decode_bare_text_verbatim() {
        let xml = response("<value> a &amp; b <!-- x --> c </value>");
        assert_eq!(decode_value(&xml), Value::from(" a & b  c "));
    }

    #[test]
    fn test_should_resolve_all_predefined_and_numeric_entities() {
        let xml = response(
            "<value><string>&lt;&gt;&amp;&quot;&apos; &#60;&#x3E;</string></value>",
        );
        assert_eq!(decode_value(&xml), Value::from("<>&\"' <>"));
    }

    #[test]
    fn test_should_keep_whitespace_around_entities() {
        let xml = response("<value><string>a &lt; b</string></value>");
        assert_eq!(decode_value(&xml), Value::from("a < b"));
    }

    #[test]
    fn test_should_read_cdata_as_text() {
        let xml = response("<value><string><![CDATA[<b>bold</b>]]></string></value>");
        assert_eq!(decode_value(&xml), Value::from("<b>bold</b>"));
    }

    #[test]
    fn test_should_decode_empty_elements() {
        assert_eq!(decode_value(&response("<value/>")), Value::from(""));
        assert_eq!(decode_value(&response("<value><string/></value>")), Value::from(""));
        assert_eq!(
            decode_value(&response("<value><struct/></value>")),
            Value::Struct(Vec::new())
        );
        assert_eq!(
            decode_value(&response("<value><array><data/></array></value>")),
            Value::Array(Vec::new())
        );
    }

    #[test]
    fn test_should_reject_unknown_entity() {
        let err = decode_err(&response("<value><string>&nbsp;</string></value>"));
        assert_eq!(err.kind, ErrorKind::MalformedXml);
    }

    #[test]
    fn test_should_reject_text_mixed_with_typed_child() {
        let err = decode_err(&response("<value>oops<int>1</int></value>"));
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    // -- typed values --------------------------------------------------------

    #[test]
    fn test_should_decode_scalars() {
        assert_eq!(decode_value(&response("<value><i4>41</i4></value>")), Value::Int(41));
        assert_eq!(decode_value(&response("<value><int> 14 </int></value>")), Value::Int(14));
        assert_eq!(
            decode_value(&response("<value><boolean>1</boolean></value>")),
            Value::Boolean(true)
        );
        assert_eq!(
            decode_value(&response("<value><double>33.25</double></value>")),
            Value::Double(33.25)
        );
        assert_eq!(
            decode_value(&response("<value><base64>aGVsbG8=</base64></value>")).as_bytes(),
            Some(&b"hello"[..])
        );

        let expected = NaiveDate::from_ymd_opt(1998, 7, 17)
            .and_then(|d| d.and_hms_opt(14, 8, 55))
            .expect("valid timestamp");
        assert_eq!(
            decode_value(&response(
                "<value><dateTime.iso8601>19980717T14:08:55</dateTime.iso8601></value>"
            )),
            Value::DateTime(expected)
        );
    }

    #[test]
    fn test_should_decode_nested_array_in_order() {
        let xml = response(
            r"<value><array><data>
                <value><i4>41</i4></value>
                <value><boolean>1</boolean></value>
                <value><array><data>
                  <value><string>Hello</string></value>
                  <value><double>0.5</double></value>
                </data></array></value>
              </data></array></value>",
        );
        assert_eq!(
            decode_value(&xml),
            Value::Array(vec![
                Value::Int(41),
                Value::Boolean(true),
                Value::Array(vec![Value::from("Hello"), Value::Double(0.5)]),
            ])
        );
    }

    #[test]
    fn test_should_decode_struct_in_member_order() {
        let xml = response(
            r"<value><struct>
                <member><name>b</name><value><i4>41</i4></value></member>
                <member><value><boolean>1</boolean></value><name>a</name></member>
                <member>
                  <name>c</name>
                  <value><struct>
                    <member><name>xxx</name><value>Hello</value></member>
                  </struct></value>
                </member>
              </struct></value>",
        );
        assert_eq!(
            decode_value(&xml),
            Value::Struct(vec![
                ("b".to_owned(), Value::Int(41)),
                ("a".to_owned(), Value::Boolean(true)),
                (
                    "c".to_owned(),
                    Value::Struct(vec![("xxx".to_owned(), Value::from("Hello"))])
                ),
            ])
        );
    }

    #[test]
    fn test_should_reject_malformed_members() {
        let missing_name =
            decode_err(&response("<value><struct><member><value>1</value></member></struct></value>"));
        assert_eq!(missing_name.kind, ErrorKind::Structural);

        let missing_value =
            decode_err(&response("<value><struct><member><name>a</name></member></struct></value>"));
        assert_eq!(missing_value.kind, ErrorKind::Structural);
        assert!(missing_value.detail.contains("'a'"));
    }

    #[test]
    fn test_should_apply_duplicate_member_policy() {
        let xml = response(
            "<value><struct>\
             <member><name>k</name><value><int>1</int></value></member>\
             <member><name>other</name><value><int>2</int></value></member>\
             <member><name>k</name><value><int>3</int></value></member>\
             </struct></value>",
        );

        let last = decode_value(&xml);
        assert_eq!(
            last,
            Value::Struct(vec![
                ("k".to_owned(), Value::Int(3)),
                ("other".to_owned(), Value::Int(2)),
            ])
        );

        let first_config = DecoderConfig::builder()
            .duplicate_members(DuplicateMembers::FirstWins)
            .build();
        let first = decode_with(first_config, &xml)
            .expect("document should decode")
            .expect("response should not be a fault");
        assert_eq!(first.get("k"), Some(&Value::Int(1)));

        let reject_config = DecoderConfig::builder()
            .duplicate_members(DuplicateMembers::Reject)
            .build();
        let err = decode_with(reject_config, &xml).expect_err("duplicates must be rejected");
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_reject_array_without_data() {
        let err = decode_err(&response("<value><array><value>1</value></array></value>"));
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_report_type_coercion() {
        let err = decode_err(&response("<value><int>twelve</int></value>"));
        assert_eq!(err.kind, ErrorKind::TypeCoercion);
    }

    #[test]
    fn test_should_report_unsupported_type() {
        let err = decode_err(&response("<value><float>1.5</float></value>"));
        assert_eq!(err.kind, ErrorKind::UnsupportedType);

        let config = DecoderConfig::builder().unknown_types_as_string(true).build();
        let value = decode_with(config, &response("<value><float>1.5</float></value>"))
            .expect("document should decode");
        assert_eq!(value, Ok(Value::from("1.5")));
    }

    #[test]
    fn test_should_gate_extension_types() {
        let nil = response("<value><nil/></value>");
        assert_eq!(decode_err(&nil).kind, ErrorKind::UnsupportedType);

        let config = DecoderConfig::builder().allow_nil(true).allow_i8(true).build();
        assert_eq!(decode_with(config.clone(), &nil), Ok(Ok(Value::Nil)));
        assert_eq!(
            decode_with(config, &response("<value><i8>9000000000</i8></value>")),
            Ok(Ok(Value::Long(9_000_000_000)))
        );

        let apache = DecoderConfig::builder().apache_extensions(true).build();
        assert_eq!(
            decode_with(apache, &response("<value><ex:nil/></value>")),
            Ok(Ok(Value::Nil))
        );
    }

    #[test]
    fn test_should_enforce_max_depth() {
        let xml = response(
            "<value><array><data><value><array><data>\
             <value><array><data/></array></value>\
             </data></array></value></data></array></value>",
        );
        assert!(decode(&xml).is_ok());

        let config = DecoderConfig::builder().max_depth(2).build();
        let err = decode_with(config, &xml).expect_err("depth limit must apply");
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    fn nested_arrays(levels: usize) -> String {
        let open = "<value><array><data>".repeat(levels);
        let close = "</data></array></value>".repeat(levels);
        format!("<methodResponse><params><param>{open}{close}</param></params></methodResponse>")
    }

    #[test]
    fn test_should_decode_deep_nesting_without_depth_limit() {
        const LEVELS: usize = 100_000;

        let value = decode_value(&nested_arrays(LEVELS));

        let mut depth = 1;
        let mut current = &value;
        while let Some([inner]) = current.as_array() {
            depth += 1;
            current = inner;
        }
        assert_eq!(depth, LEVELS);
        assert_eq!(current.as_array().map(<[Value]>::len), Some(0));
    }

    #[test]
    fn test_should_decode_deep_struct_nesting() {
        const LEVELS: usize = 50_000;

        let open = "<value><struct><member><name>n</name>".repeat(LEVELS);
        let close = "</member></struct></value>".repeat(LEVELS);
        let xml = format!(
            "<methodResponse><params><param>{open}<value>leaf</value>{close}</param></params></methodResponse>"
        );

        let value = decode_value(&xml);
        let mut depth = 0;
        let mut current = &value;
        while let Some(inner) = current.get("n") {
            depth += 1;
            current = inner;
        }
        assert_eq!(depth, LEVELS);
        assert_eq!(current.as_str(), Some("leaf"));
    }

    #[test]
    fn test_should_reject_deep_nesting_past_configured_limit() {
        let config = DecoderConfig::builder().max_depth(64).build();
        let err = decode_with(config, &nested_arrays(100_000))
            .expect_err("depth limit must apply");
        assert_eq!(err.kind, ErrorKind::Structural);
        assert!(err.detail.contains("64"));
    }

    // -- document structure --------------------------------------------------

    #[test]
    fn test_should_reject_wrong_root() {
        let err = decode_err(
            "<methodCall><params><param><value>x</value></param></params></methodCall>",
        );
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_reject_empty_document() {
        assert_eq!(decode_err("").kind, ErrorKind::Structural);
        assert_eq!(decode_err(XML_DECL).kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_reject_params_and_fault_together() {
        let err = decode_err(
            "<methodResponse><params><param><value>x</value></param></params>\
             <fault><value>y</value></fault></methodResponse>",
        );
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_reject_empty_method_response() {
        let err = decode_err("<methodResponse></methodResponse>");
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_reject_extra_param_and_value() {
        let extra_param = decode_err(
            "<methodResponse><params><param><value>x</value></param>\
             <param><value>y</value></param></params></methodResponse>",
        );
        assert_eq!(extra_param.kind, ErrorKind::Structural);

        let extra_value = decode_err(
            "<methodResponse><params><param><value>x</value><value>y</value></param>\
             </params></methodResponse>",
        );
        assert_eq!(extra_value.kind, ErrorKind::Structural);

        let missing_value =
            decode_err("<methodResponse><params><param></param></params></methodResponse>");
        assert_eq!(missing_value.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_reject_second_root() {
        let xml = format!("{}<methodResponse/>", response("<value>x</value>"));
        assert_eq!(decode_err(&xml).kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_require_declaration_when_configured() {
        let config = DecoderConfig::builder().declaration_optional(false).build();
        let body = response("<value>x</value>");

        let err = decode_with(config.clone(), &body).expect_err("declaration is required");
        assert_eq!(err.kind, ErrorKind::Structural);
        assert_eq!(
            decode_with(config, &format!("{XML_DECL}{body}")),
            Ok(Ok(Value::from("x")))
        );
    }

    #[test]
    fn test_should_report_malformed_xml() {
        let unclosed = decode_err("<methodResponse><params><param><value>x");
        assert_eq!(unclosed.kind, ErrorKind::MalformedXml);

        let mismatched = decode_err(
            "<methodResponse><params><param><value>x</param></value></params></methodResponse>",
        );
        assert_eq!(mismatched.kind, ErrorKind::MalformedXml);
    }

    // -- faults --------------------------------------------------------------

    fn fault_response(members: &str) -> String {
        format!("<methodResponse><fault><value><struct>{members}</struct></value></fault></methodResponse>")
    }

    #[test]
    fn test_should_reject_incomplete_fault() {
        let missing_string = decode_err(&fault_response(
            "<member><name>faultCode</name><value><int>4</int></value></member>",
        ));
        assert_eq!(missing_string.kind, ErrorKind::Structural);

        let wrong_code = decode_err(&fault_response(
            "<member><name>faultCode</name><value>four</value></member>\
             <member><name>faultString</name><value>boom</value></member>",
        ));
        assert_eq!(wrong_code.kind, ErrorKind::TypeCoercion);

        let not_struct = decode_err(
            "<methodResponse><fault><value><int>4</int></value></fault></methodResponse>",
        );
        assert_eq!(not_struct.kind, ErrorKind::Structural);
    }

    #[test]
    fn test_should_accept_bare_fault_string() {
        let result = decode(&fault_response(
            "<member><name>faultString</name><value>boom</value></member>\
             <member><name>faultCode</name><value><i4>-32601</i4></value></member>",
        ))
        .expect("document should decode");
        assert_eq!(result, Err(Fault::new(-32601, "boom")));
    }

    #[test]
    fn test_should_accept_i8_fault_code_within_int_range() {
        let config = DecoderConfig::builder().allow_i8(true).build();
        let xml = fault_response(
            "<member><name>faultCode</name><value><i8>4</i8></value></member>\
             <member><name>faultString</name><value>boom</value></member>",
        );
        assert_eq!(decode_with(config, &xml), Ok(Err(Fault::new(4, "boom"))));
    }

    #[test]
    fn test_should_reject_i8_fault_code_out_of_int_range() {
        let config = DecoderConfig::builder().allow_i8(true).build();
        let xml = fault_response(
            "<member><name>faultCode</name><value><i8>9000000000</i8></value></member>\
             <member><name>faultString</name><value>boom</value></member>",
        );
        let err = decode_with(config, &xml).expect_err("out of range faultCode must fail");
        assert_eq!(err.kind, ErrorKind::TypeCoercion);
    }

    // -- decoder properties --------------------------------------------------

    #[test]
    fn test_should_decode_deterministically() {
        let xml = response(
            "<value><struct><member><name>a</name><value><double>0.1</double></value></member>\
             </struct></value>",
        );
        assert_eq!(decode(&xml), decode(&xml));
    }

    #[test]
    fn test_should_share_decoder_across_threads() {
        let decoder = std::sync::Arc::new(Decoder::default());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let decoder = std::sync::Arc::clone(&decoder);
                std::thread::spawn(move || {
                    let xml = response(&format!("<value><int>{i}</int></value>"));
                    decoder.try_decode(xml.as_bytes())
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.join().expect("decode thread panicked");
            let expected = i32::try_from(i).expect("small index");
            assert_eq!(result, Ok(Ok(Value::Int(expected))));
        }
    }

    #[test]
    fn test_should_surface_stream_errors() {
        struct FailingReader;

        impl std::io::Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            }
        }

        let err = Decoder::default()
            .try_decode(std::io::BufReader::new(FailingReader))
            .expect_err("read failure must surface");
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
