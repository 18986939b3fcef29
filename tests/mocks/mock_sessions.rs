use super::mock_session_factory::MockUpstream;
use icloud_gateway::error::{GatewayError, GatewayResult};
use icloud_gateway::session::{
    AbortSignal, DavCollection, DavObject, DavQuery, DavSession, FetchedMessage, ImapSession,
    MailSearch, MailboxInfo, OutgoingMail, Precondition, SmtpSession,
};
use std::sync::Arc;

/// CalDAV/CardDAV double. REPORTs return every object under the collection; the
/// adapter does its own window filtering.
pub struct MockDav {
    upstream: Arc<MockUpstream>,
    abort: AbortSignal,
}

impl MockDav {
    pub fn new(upstream: Arc<MockUpstream>, abort: AbortSignal) -> Self {
        Self { upstream, abort }
    }
}

impl DavSession for MockDav {
    fn collections(&mut self) -> GatewayResult<Vec<DavCollection>> {
        self.upstream.simulate_latency(&self.abort)?;
        Ok(self.upstream.collections.lock().unwrap().clone())
    }

    fn query(&mut self, collection_href: &str, _query: &DavQuery) -> GatewayResult<Vec<DavObject>> {
        self.upstream.simulate_latency(&self.abort)?;
        Ok(self
            .upstream
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.href.starts_with(collection_href))
            .cloned()
            .collect())
    }

    fn get(&mut self, href: &str) -> GatewayResult<DavObject> {
        self.upstream.simulate_latency(&self.abort)?;
        self.upstream
            .object(href)
            .ok_or_else(|| GatewayError::from_http_status(404, &format!("GET {}", href)))
    }

    fn put(
        &mut self,
        href: &str,
        body: &str,
        precondition: &Precondition,
    ) -> GatewayResult<Option<String>> {
        self.upstream.simulate_latency(&self.abort)?;
        let mut objects = self.upstream.objects.lock().unwrap();
        let current = objects.get(href).and_then(|o| o.etag.clone());
        let allowed = match precondition {
            Precondition::Create => !objects.contains_key(href),
            Precondition::Update(None) => true,
            Precondition::Update(Some(expected)) => current.as_deref() == Some(expected.as_str()),
        };
        if !allowed {
            return Err(GatewayError::from_http_status(412, &format!("PUT {}", href)));
        }

        let etag = self.upstream.next_etag();
        objects.insert(
            href.to_string(),
            DavObject {
                href: href.to_string(),
                etag: Some(etag.clone()),
                data: Some(body.to_string()),
            },
        );
        Ok(Some(etag))
    }

    fn delete(&mut self, href: &str) -> GatewayResult<()> {
        self.upstream.simulate_latency(&self.abort)?;
        match self.upstream.objects.lock().unwrap().remove(href) {
            Some(_) => Ok(()),
            None => Err(GatewayError::from_http_status(404, &format!("DELETE {}", href))),
        }
    }

    fn close(&mut self) {
        self.upstream.record_close();
    }
}

/// IMAP double with per-folder message lists.
pub struct MockImap {
    upstream: Arc<MockUpstream>,
    abort: AbortSignal,
    selected: Option<String>,
}

impl MockImap {
    pub fn new(upstream: Arc<MockUpstream>, abort: AbortSignal) -> Self {
        Self {
            upstream,
            abort,
            selected: None,
        }
    }

    fn selected(&self) -> GatewayResult<String> {
        self.selected
            .clone()
            .ok_or_else(|| GatewayError::Protocol("no mailbox selected".to_string()))
    }

    fn log(&self, line: String) {
        self.upstream.imap_log.lock().unwrap().push(line);
    }

    fn with_message<T>(
        &self,
        uid: u32,
        f: impl FnOnce(&mut FetchedMessage) -> T,
    ) -> GatewayResult<T> {
        let folder = self.selected()?;
        let mut mailboxes = self.upstream.mailboxes.lock().unwrap();
        mailboxes
            .get_mut(&folder)
            .and_then(|messages| messages.iter_mut().find(|m| m.uid == uid))
            .map(f)
            .ok_or_else(|| GatewayError::Protocol(format!("UID {} not in {}", uid, folder)))
    }
}

impl ImapSession for MockImap {
    fn list_folders(&mut self) -> GatewayResult<Vec<MailboxInfo>> {
        self.upstream.simulate_latency(&self.abort)?;
        Ok(self.upstream.folders.lock().unwrap().clone())
    }

    fn select(&mut self, folder: &str) -> GatewayResult<()> {
        self.upstream.simulate_latency(&self.abort)?;
        if !self.upstream.mailboxes.lock().unwrap().contains_key(folder) {
            return Err(GatewayError::NotFound(format!("Mailbox {}", folder)));
        }
        self.selected = Some(folder.to_string());
        Ok(())
    }

    fn search(&mut self, criteria: &MailSearch) -> GatewayResult<Vec<u32>> {
        let folder = self.selected()?;
        let mailboxes = self.upstream.mailboxes.lock().unwrap();
        let messages = mailboxes.get(&folder).cloned().unwrap_or_default();
        Ok(messages
            .iter()
            .filter(|m| match criteria {
                MailSearch::All => true,
                MailSearch::Unseen => !m.flags.iter().any(|f| f == "\\Seen"),
                MailSearch::Uid(uid) => m.uid == *uid,
                MailSearch::SubjectOrFrom(text) => String::from_utf8_lossy(&m.raw)
                    .lines()
                    .filter(|l| l.starts_with("Subject:") || l.starts_with("From:"))
                    .any(|l| l.to_lowercase().contains(&text.to_lowercase())),
            })
            .map(|m| m.uid)
            .collect())
    }

    fn fetch(&mut self, uids: &[u32], _with_body: bool) -> GatewayResult<Vec<FetchedMessage>> {
        let folder = self.selected()?;
        let mailboxes = self.upstream.mailboxes.lock().unwrap();
        Ok(mailboxes
            .get(&folder)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| uids.contains(&m.uid))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn has_capability(&mut self, capability: &str) -> GatewayResult<bool> {
        Ok(self
            .upstream
            .capabilities
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(capability)))
    }

    fn copy(&mut self, uid: u32, dest_folder: &str) -> GatewayResult<()> {
        let message = self.with_message(uid, |m| m.clone())?;
        self.upstream.add_message(
            dest_folder,
            message.uid,
            &[],
            &String::from_utf8_lossy(&message.raw),
        );
        self.log(format!("COPY {} {}", uid, dest_folder));
        Ok(())
    }

    fn move_message(&mut self, uid: u32, dest_folder: &str) -> GatewayResult<()> {
        let message = self.with_message(uid, |m| m.clone())?;
        let folder = self.selected()?;
        if let Some(messages) = self.upstream.mailboxes.lock().unwrap().get_mut(&folder) {
            messages.retain(|m| m.uid != uid);
        }
        self.upstream.add_message(
            dest_folder,
            message.uid,
            &[],
            &String::from_utf8_lossy(&message.raw),
        );
        self.log(format!("MOVE {} {}", uid, dest_folder));
        Ok(())
    }

    fn add_flags(&mut self, uid: u32, flags: &[&str]) -> GatewayResult<()> {
        self.with_message(uid, |m| {
            for flag in flags {
                if !m.flags.iter().any(|f| f == flag) {
                    m.flags.push(flag.to_string());
                }
            }
        })?;
        self.log(format!("STORE {} +FLAGS {}", uid, flags.join(" ")));
        Ok(())
    }

    fn remove_flags(&mut self, uid: u32, flags: &[&str]) -> GatewayResult<()> {
        self.with_message(uid, |m| m.flags.retain(|f| !flags.contains(&f.as_str())))?;
        self.log(format!("STORE {} -FLAGS {}", uid, flags.join(" ")));
        Ok(())
    }

    fn expunge(&mut self, uid: u32) -> GatewayResult<()> {
        let folder = self.selected()?;
        if let Some(messages) = self.upstream.mailboxes.lock().unwrap().get_mut(&folder) {
            messages.retain(|m| m.uid != uid);
        }
        self.log(format!("EXPUNGE {}", uid));
        Ok(())
    }

    fn logout(&mut self) {
        self.upstream.record_close();
    }
}

/// SMTP double that records every submitted message.
pub struct MockSmtp {
    upstream: Arc<MockUpstream>,
    abort: AbortSignal,
}

impl MockSmtp {
    pub fn new(upstream: Arc<MockUpstream>, abort: AbortSignal) -> Self {
        Self { upstream, abort }
    }
}

impl SmtpSession for MockSmtp {
    fn send(&mut self, mail: &OutgoingMail) -> GatewayResult<()> {
        self.upstream.simulate_latency(&self.abort)?;
        self.upstream.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }

    fn quit(&mut self) {
        self.upstream.record_close();
    }
}
