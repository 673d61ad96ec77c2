use super::call::Call;
use super::dialog::{is_sentinel, Dialog, Party};
use super::events::{cast_dialog, cast_session, DialogNotice, SessionNotice};
use super::Role;
use rsip::prelude::ToTypedHeader;
use std::time::Instant;
use tracing::{debug, warn};

/// Compute the route set from Record-Route headers the first time the
/// dialog is answered.
///
/// The UAC reads them from the response and reverses their order; the UAS
/// reads them from the request as-is. A leading hop that points at one of
/// our own listening addresses is dropped. Once the dialog has been
/// answered the route set is frozen.
pub(super) fn route_update(class: Role, dialog: &mut Dialog, call: &Call) {
    if dialog.answered.is_some() {
        return;
    }
    let mut route_set = if class.is_uac_side() {
        let mut routes = dialog
            .invite_resp
            .as_ref()
            .map(|resp| record_routes(&resp.headers))
            .unwrap_or_default();
        routes.reverse();
        routes
    } else {
        dialog
            .invite_req
            .as_ref()
            .map(|req| record_routes(&req.headers))
            .unwrap_or_default()
    };
    let head_is_local = route_set
        .first()
        .map(|first| call.transport.is_local(&call.app_id, first))
        .unwrap_or(false);
    if head_is_local {
        debug!(id = %dialog.id, hop = %route_set[0], "dropping local first route hop");
        route_set.remove(0);
    }
    dialog.route_set = route_set;
}

fn record_routes(headers: &rsip::Headers) -> Vec<rsip::Uri> {
    let mut routes = Vec::new();
    for header in headers.iter() {
        if let rsip::Header::RecordRoute(rr) = header {
            if let Ok(typed) = rr.typed() {
                for entry in typed.uris() {
                    routes.push(entry.uri.clone());
                }
            }
        }
    }
    routes
}

/// Refresh the dialog targets from the stored INVITE exchange.
///
/// Exactly one Contact on a side replaces that side's target (upgraded to
/// `sips` for secure dialogs); zero or several leave the previous target in
/// place. The first final response latches `early` off and stamps
/// `answered`. A genuine remote-target change after first establishment is
/// reported to the application.
pub(super) fn target_update(class: Role, dialog: &mut Dialog, call: &Call) {
    let (code, remote_contacts, local_contacts) = {
        let (req, resp) = match (dialog.invite_req.as_ref(), dialog.invite_resp.as_ref()) {
            (Some(req), Some(resp)) => (req, resp),
            _ => return,
        };
        let code = u16::from(resp.status_code.clone());
        if class.is_uac_side() {
            (code, contacts(&resp.headers), contacts(&req.headers))
        } else {
            (code, contacts(&req.headers), contacts(&resp.headers))
        }
    };

    let prev_remote = dialog.remote_target.clone();
    let remote_target = match remote_contacts.as_slice() {
        [uri] => {
            let mut uri = uri.clone();
            if dialog.secure {
                uri.scheme = Some(rsip::Scheme::Sips);
            }
            uri
        }
        invalid => {
            warn!(
                id = %dialog.id,
                contacts = invalid.len(),
                "ignoring remote Contact refresh, expected exactly one"
            );
            prev_remote.clone()
        }
    };
    let local_target = match local_contacts.as_slice() {
        [uri] => uri.clone(),
        _ => dialog.local_target.clone(),
    };

    dialog.early = dialog.early && (100..200).contains(&code);
    if dialog.answered.is_none() && code >= 200 {
        dialog.answered = Some(Instant::now());
    }

    let remote_changed = remote_target != prev_remote;
    dialog.remote_target = remote_target;
    dialog.local_target = local_target;
    if remote_changed && !is_sentinel(&prev_remote) {
        cast_dialog(&call.events, &dialog.id, DialogNotice::TargetUpdate);
    }

    // While the INVITE exchange is still in flight, keep the Contact of the
    // stored request aligned with the refreshed target so a later final
    // response is built against the current one.
    let in_flight = dialog
        .invite_resp
        .as_ref()
        .map(|resp| u16::from(resp.status_code.clone()) < 200)
        .unwrap_or(false);
    if in_flight {
        let contact = match dialog.invite_class {
            Some(Role::Uas) => Some(dialog.remote_target.clone()),
            Some(Role::Uac) | Some(Role::Proxy) => Some(dialog.local_target.clone()),
            None => None,
        };
        if let (Some(req), Some(uri)) = (dialog.invite_req.as_mut(), contact) {
            set_contact(req, uri);
        }
    }
}

fn contacts(headers: &rsip::Headers) -> Vec<rsip::Uri> {
    let mut uris = Vec::new();
    for header in headers.iter() {
        if let rsip::Header::Contact(contact) = header {
            if let Ok(typed) = contact.typed() {
                uris.push(typed.uri);
            }
        }
    }
    uris
}

fn set_contact(req: &mut rsip::Request, uri: rsip::Uri) {
    let contact = rsip::typed::Contact {
        display_name: None,
        uri,
        params: vec![],
    };
    req.headers
        .retain(|header| !matches!(header, rsip::Header::Contact(_)));
    req.headers.push(rsip::Header::Contact(contact.into()));
}

/// Commit a completed offer/answer exchange into the dialog session state.
///
/// Runs only once both slots hold a concrete SDP. The first commit starts
/// the session; later commits report an update only when either side's SDP
/// actually describes a newer session. Both slots are consumed either way.
pub(super) fn session_update(dialog: &mut Dialog, call: &Call) {
    let (local_sdp, remote_sdp) = {
        let (offer, answer) = match (dialog.sdp_offer.as_ref(), dialog.sdp_answer.as_ref()) {
            (Some(offer), Some(answer)) => (offer, answer),
            _ => return,
        };
        match (offer.party, answer.party) {
            (Party::Local, Party::Remote) => (offer.sdp.clone(), answer.sdp.clone()),
            (Party::Remote, Party::Local) => (answer.sdp.clone(), offer.sdp.clone()),
            _ => return,
        }
    };

    if !dialog.media_started {
        cast_session(
            &call.events,
            &dialog.id,
            SessionNotice::Start {
                local_sdp: local_sdp.clone(),
                remote_sdp: remote_sdp.clone(),
            },
        );
    } else {
        let local_changed = dialog
            .local_sdp
            .as_ref()
            .map(|old| local_sdp.is_new(old))
            .unwrap_or(true);
        let remote_changed = dialog
            .remote_sdp
            .as_ref()
            .map(|old| remote_sdp.is_new(old))
            .unwrap_or(true);
        if local_changed || remote_changed {
            cast_session(
                &call.events,
                &dialog.id,
                SessionNotice::Update {
                    local_sdp: local_sdp.clone(),
                    remote_sdp: remote_sdp.clone(),
                },
            );
        }
    }

    dialog.local_sdp = Some(local_sdp);
    dialog.remote_sdp = Some(remote_sdp);
    dialog.media_started = true;
    dialog.sdp_offer = None;
    dialog.sdp_answer = None;
}
