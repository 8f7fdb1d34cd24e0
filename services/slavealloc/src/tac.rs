//! `buildbot.tac` rendering.
//!
//! The tac file is Python source executed by the buildslave, so every string
//! value is emitted as a Python string literal.

use std::fmt::Write as _;

use chrono::Utc;

use crate::allocation::Allocation;

/// Where and when a tac file was generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TacContext {
    pub gendate: String,
    pub genhost: String,
}

impl TacContext {
    /// Context for a file generated now, on this host.
    ///
    /// `genhost` is the host name as the OS reports it, which is not
    /// necessarily fully qualified; no DNS lookup is made.
    pub fn current() -> Self {
        let genhost = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            gendate: Utc::now().format("%a %b %e %H:%M:%S %Y").to_string(),
            genhost,
        }
    }
}

/// Render the `buildbot.tac` for an allocation.
pub fn render_buildbot_tac(allocation: &Allocation, context: &TacContext) -> String {
    let mut tac = String::with_capacity(1200);

    // Writing to a String cannot fail.
    let _ = write!(
        tac,
        r#"# AUTOMATICALLY GENERATED - DO NOT MODIFY
# generated: {gendate} on {genhost}
from twisted.application import service
from buildbot.slave.bot import BuildSlave
from twisted.python.logfile import LogFile
from twisted.python.log import ILogObserver, FileLogObserver

maxdelay = 300
buildmaster_host = {buildmaster_host}
passwd = {passwd}
maxRotatedFiles = None
basedir = {basedir}
umask = 002
slavename = {slavename}
usepty = 1
rotateLength = 1000000
port = {port}
keepalive = None

application = service.Application('buildslave')
logfile = LogFile.fromFullPath("twistd.log", rotateLength=rotateLength,
                             maxRotatedFiles=maxRotatedFiles)
application.setComponent(ILogObserver, FileLogObserver(logfile).emit)
s = BuildSlave(buildmaster_host, port, slavename, passwd, basedir,
               keepalive, usepty, umask=umask, maxdelay=maxdelay)
s.setServiceParent(application)
"#,
        gendate = context.gendate,
        genhost = context.genhost,
        buildmaster_host = py_str(&allocation.master.fqdn),
        passwd = py_str(&allocation.password),
        basedir = py_str(&allocation.basedir),
        slavename = py_str(&allocation.slave_name),
        port = allocation.master.pb_port,
    );

    tac
}

/// Quote `s` the way Python's `repr()` quotes a string.
fn py_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
