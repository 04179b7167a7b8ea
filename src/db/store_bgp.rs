use anyhow::Result;

use crate::models::*;
use super::Store;
use super::{bgp_globals, bgp_sessions, peer_groups};

impl Store {
    // ========== BGP Session Operations ==========

    pub async fn list_bgp_sessions(&self, filter: &ListFilter) -> Result<Vec<BgpSession>> {
        bgp_sessions::BgpSessionRepo::list(&self.pool, filter).await
    }

    pub async fn get_bgp_session(&self, id: i64) -> Result<Option<BgpSession>> {
        bgp_sessions::BgpSessionRepo::get(&self.pool, id).await
    }

    pub async fn create_bgp_session(&self, req: &BgpSessionRequest) -> Result<BgpSession> {
        bgp_sessions::BgpSessionRepo::create(&self.pool, req).await
    }

    pub async fn update_bgp_session(&self, id: i64, req: &BgpSessionRequest) -> Result<BgpSession> {
        bgp_sessions::BgpSessionRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_bgp_session(&self, id: i64) -> Result<()> {
        bgp_sessions::BgpSessionRepo::delete(&self.pool, id).await
    }

    // ========== Device BGP Session Operations ==========

    pub async fn list_device_bgp_sessions(&self, filter: &ListFilter) -> Result<Vec<DeviceBgpSession>> {
        bgp_sessions::DeviceBgpSessionRepo::list(&self.pool, filter).await
    }

    pub async fn get_device_bgp_session(&self, id: i64) -> Result<Option<DeviceBgpSession>> {
        bgp_sessions::DeviceBgpSessionRepo::get(&self.pool, id).await
    }

    // ========== BGP Peer Group Operations ==========

    pub async fn list_peer_groups(&self, filter: &ListFilter) -> Result<Vec<BgpPeerGroup>> {
        peer_groups::PeerGroupRepo::list(&self.pool, filter).await
    }

    pub async fn get_peer_group(&self, id: i64) -> Result<Option<BgpPeerGroup>> {
        peer_groups::PeerGroupRepo::get(&self.pool, id).await
    }

    pub async fn create_peer_group(&self, req: &BgpPeerGroupRequest) -> Result<BgpPeerGroup> {
        peer_groups::PeerGroupRepo::create(&self.pool, req).await
    }

    pub async fn update_peer_group(&self, id: i64, req: &BgpPeerGroupRequest) -> Result<BgpPeerGroup> {
        peer_groups::PeerGroupRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_peer_group(&self, id: i64) -> Result<()> {
        peer_groups::PeerGroupRepo::delete(&self.pool, id).await
    }

    // ========== BGP Global Operations ==========

    pub async fn list_bgp_globals(&self, filter: &ListFilter) -> Result<Vec<BgpGlobal>> {
        bgp_globals::BgpGlobalRepo::list(&self.pool, filter).await
    }

    pub async fn get_bgp_global(&self, id: i64) -> Result<Option<BgpGlobal>> {
        bgp_globals::BgpGlobalRepo::get(&self.pool, id).await
    }

    pub async fn create_bgp_global(&self, req: &BgpGlobalRequest) -> Result<BgpGlobal> {
        bgp_globals::BgpGlobalRepo::create(&self.pool, req).await
    }

    pub async fn update_bgp_global(&self, id: i64, req: &BgpGlobalRequest) -> Result<BgpGlobal> {
        bgp_globals::BgpGlobalRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_bgp_global(&self, id: i64) -> Result<()> {
        bgp_globals::BgpGlobalRepo::delete(&self.pool, id).await
    }
}
